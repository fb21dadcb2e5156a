pub mod job;
pub mod message;
pub mod request;

mod error;

use std::{future::Future, pin::Pin};

pub use error::{Error, Result};
pub use job::{JobId, JobStatus, SubFunction};
pub use message::{ResultKind, ResultMessage, TaskMessage, TaskPayload};
pub use request::{JobRequest, MAX_PROMPT_CHARS};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
