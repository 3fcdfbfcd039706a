//! Daily cleanup scheduler, per 4.9.
//!
//! A single process-wide task sleeps until the next `02:00 UTC` tick,
//! runs [`run_cleanup_once`], and repeats. The same routine backs the
//! on-demand admin HTTP endpoint.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveTime, TimeZone, Utc};

use crate::adapters::{self, DatabaseKind};
use crate::config::{Config, DefaultDatabaseConfig};

/// Spawn the background daily-cleanup task. Returns immediately; the
/// task runs until the process exits.
pub fn spawn_daily_cleanup(config: Arc<Config>) {
    tokio::spawn(async move {
        loop {
            let wait = duration_until_next_run(Utc::now());
            tracing::info!(seconds = wait.as_secs(), "scheduler sleeping until next cleanup run");
            tokio::time::sleep(wait).await;
            run_cleanup_once(&config).await;
        }
    });
}

/// How long to sleep from `now` until the next `02:00 UTC`.
pub fn duration_until_next_run(now: chrono::DateTime<Utc>) -> Duration {
    let today_run = Utc.from_utc_datetime(
        &now.date_naive().and_time(NaiveTime::from_hms_opt(2, 0, 0).expect("valid time")),
    );
    let next_run = if now < today_run { today_run } else { today_run + chrono::Duration::days(1) };
    (next_run - now).to_std().unwrap_or(Duration::from_secs(1))
}

/// Run the cleanup routine once, synchronously, against every
/// configured default connection. Errors are logged per database and
/// never abort the loop — matches the on-demand admin endpoint's call
/// path exactly.
pub async fn run_cleanup_once(config: &Config) {
    for db in &config.default_databases {
        if let Err(e) = cleanup_one(db, config.query_timeout()).await {
            tracing::error!(database = %db.display_name, kind = %db.kind, error = %e, "cleanup failed for database");
        }
    }
}

async fn cleanup_one(db: &DefaultDatabaseConfig, query_timeout: Duration) -> crate::error::Result<()> {
    let admin_url = administrative_url(db.kind, &db.url)?;
    let mut adapter = adapters::new_adapter(db.kind, query_timeout);
    adapter.connect(&admin_url).await?;
    let result = adapter.drop_all_user_databases().await;
    let _ = adapter.disconnect().await;
    result
}

fn administrative_url(kind: DatabaseKind, url: &str) -> crate::error::Result<String> {
    match kind {
        DatabaseKind::Postgresql => rewrite_path(url, "/postgres"),
        DatabaseKind::Mysql => rewrite_path(url, ""),
        DatabaseKind::Mongodb => Ok(url.to_string()),
    }
}

fn rewrite_path(url: &str, new_path: &str) -> crate::error::Result<String> {
    let mut parsed = url::Url::parse(url)
        .map_err(|e| crate::error::GatewayError::server(format!("invalid connection URL: {}", e)))?;
    parsed.set_path(new_path);
    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sleeps_until_same_day_02_00_when_before_it() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 1, 0, 0).unwrap();
        let wait = duration_until_next_run(now);
        assert_eq!(wait.as_secs(), 3600);
    }

    #[test]
    fn sleeps_until_next_day_02_00_when_after_it() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 3, 0, 0).unwrap();
        let wait = duration_until_next_run(now);
        assert_eq!(wait.as_secs(), 23 * 3600);
    }

    #[test]
    fn postgres_admin_url_targets_postgres_database() {
        let url = administrative_url(DatabaseKind::Postgresql, "postgres://u:p@host:5432/u_abc").unwrap();
        assert!(url.ends_with("/postgres"));
    }

    #[test]
    fn mysql_admin_url_has_empty_path() {
        let url = administrative_url(DatabaseKind::Mysql, "mysql://u:p@host:3306/u_abc").unwrap();
        assert!(url.ends_with("host:3306/") || url.ends_with("host:3306"));
    }
}
