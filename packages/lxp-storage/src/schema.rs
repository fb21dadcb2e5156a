/// Idempotent DDL for threads, jobs and vectorstore files.
pub fn render_schema() -> &'static str {
	include_str!("../../../sql/init.sql")
}

pub fn statements(sql: &str) -> impl Iterator<Item = &str> {
	sql.split(';').map(str::trim).filter(|statement| !statement.is_empty())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn schema_creates_every_table() {
		let statements = statements(render_schema()).collect::<Vec<_>>();

		for table in ["threads", "jobs", "vectorstores", "vectorstore_files"] {
			let needle = format!("CREATE TABLE IF NOT EXISTS {table} ");

			assert!(statements.iter().any(|s| s.starts_with(&needle)), "missing table {table}");
		}
		assert!(statements.iter().all(|s| s.contains("IF NOT EXISTS")));
	}
}
