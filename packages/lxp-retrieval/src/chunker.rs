//! Fixed-window text chunking over Unicode scalar values.
//!
//! Chunk `i` starts at character `i * (window - overlap)` and spans at most `window` characters.
//! Iteration ends with the first chunk that reaches the end of the text, so the final chunk may be
//! shorter than the window. Taking the first `window - overlap` characters of every chunk except
//! the last, plus the whole last chunk, reproduces the input exactly.

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunker {
	window: usize,
	overlap: usize,
}
impl Chunker {
	pub fn new(window: usize, overlap: usize) -> Result<Self> {
		if window == 0 {
			return Err(Error::InvalidChunking {
				message: "window must be greater than zero.".to_string(),
			});
		}
		if overlap >= window {
			return Err(Error::InvalidChunking {
				message: format!("overlap {overlap} must be less than window {window}."),
			});
		}

		Ok(Self { window, overlap })
	}

	pub fn window(&self) -> usize {
		self.window
	}

	pub fn overlap(&self) -> usize {
		self.overlap
	}

	pub fn stride(&self) -> usize {
		self.window - self.overlap
	}

	/// Lazily yields chunks of `text`. Calling again restarts from the beginning.
	pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
		Chunks {
			text,
			window: self.window,
			stride: self.stride(),
			ordinal: 0,
			start_byte: 0,
			start_char: 0,
			done: text.is_empty(),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextChunk<'a> {
	pub ordinal: u32,
	/// Character offset of the first character.
	pub start: usize,
	/// Character offset one past the last character.
	pub end: usize,
	pub text: &'a str,
}

#[derive(Clone, Debug)]
pub struct Chunks<'a> {
	text: &'a str,
	window: usize,
	stride: usize,
	ordinal: u32,
	start_byte: usize,
	start_char: usize,
	done: bool,
}
impl<'a> Iterator for Chunks<'a> {
	type Item = TextChunk<'a>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.done {
			return None;
		}

		let rest = &self.text[self.start_byte..];
		let (end_byte, len) = match rest.char_indices().nth(self.window) {
			Some((offset, _)) => (self.start_byte + offset, self.window),
			None => {
				self.done = true;

				(self.text.len(), rest.chars().count())
			},
		};
		let chunk = TextChunk {
			ordinal: self.ordinal,
			start: self.start_char,
			end: self.start_char + len,
			text: &self.text[self.start_byte..end_byte],
		};

		if !self.done {
			// A full window always covers the stride, so the next start is inside this chunk.
			let advance =
				rest.char_indices().nth(self.stride).map(|(offset, _)| offset).unwrap_or(rest.len());

			self.start_byte += advance;
			self.start_char += self.stride;
			self.ordinal += 1;
		}

		Some(chunk)
	}
}
