use std::{str::FromStr, thread};

use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::runtime::Builder;
use uuid::Uuid;

use crate::{Error, Result};

const MAINTENANCE_DATABASES: [&str; 2] = ["postgres", "template1"];

/// A throwaway database created next to the one `LXP_PG_DSN` points at.
///
/// Call [`TestDatabase::cleanup`] to drop it and surface errors. Dropping without cleanup still
/// removes the database, on a helper thread so async tests are not blocked.
pub struct TestDatabase {
	name: String,
	dsn: String,
	maintenance: PgConnectOptions,
	dropped: bool,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("LXP_PG_DSN is not a valid DSN: {err}.")))?;
		let (maintenance, mut conn) = open_maintenance(&base).await?;
		let name = format!("lxp_test_{}", Uuid::new_v4().simple());

		conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str())
			.await
			.map_err(|err| Error::Message(format!("Failed to create {name}: {err}.")))?;

		let dsn = base.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, maintenance, dropped: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub fn postgres_config(&self) -> lxp_config::Postgres {
		lxp_config::Postgres { dsn: self.dsn.clone(), pool_max_conns: 4 }
	}

	pub async fn cleanup(mut self) -> Result<()> {
		self.dropped = true;

		drop_database(&self.name, &self.maintenance).await
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.dropped {
			return;
		}

		let name = self.name.clone();
		let maintenance = self.maintenance.clone();
		let worker = thread::spawn(move || {
			let outcome = Builder::new_current_thread()
				.enable_all()
				.build()
				.map_err(|err| Error::Message(err.to_string()))
				.and_then(|runtime| runtime.block_on(drop_database(&name, &maintenance)));

			if let Err(err) = outcome {
				eprintln!("Failed to drop test database {name}: {err}");
			}
		});
		let _ = worker.join();
	}
}

async fn open_maintenance(base: &PgConnectOptions) -> Result<(PgConnectOptions, PgConnection)> {
	let mut failures = Vec::new();

	for database in MAINTENANCE_DATABASES {
		let options = base.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => failures.push(format!("{database}: {err}")),
		}
	}

	Err(Error::Message(format!("No maintenance database reachable ({}).", failures.join("; "))))
}

async fn drop_database(name: &str, maintenance: &PgConnectOptions) -> Result<()> {
	let mut conn = PgConnection::connect_with(maintenance).await?;

	// Pool connections from the test may still be open.
	sqlx::query(
		"SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
		 WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(name)
	.execute(&mut conn)
	.await?;
	conn.execute(format!(r#"DROP DATABASE IF EXISTS "{name}""#).as_str()).await?;

	Ok(())
}
