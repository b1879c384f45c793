//! Pool construction for [`crate::PostgresSessionFactory`].

use std::time::Duration;

use sqlx_core::pool::PoolOptions;
use sqlx_postgres::{PgPool, Postgres};
use tracing::{debug, info, instrument};

use crate::config::PostgresConfig;
use crate::error::Result;

pub type PgPoolOptions = PoolOptions<Postgres>;

/// Connections are recycled after this long unless configured otherwise.
const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Translates `config` into pool options without connecting.
///
/// The idle floor defaults to a quarter of the pool and never exceeds it.
pub fn pool_options(config: &PostgresConfig) -> PgPoolOptions {
    let min_connections = config
        .min_connections
        .unwrap_or(config.pool_size / 4)
        .clamp(1, config.pool_size.max(1));

    let max_lifetime = config
        .max_lifetime_secs
        .map_or(DEFAULT_MAX_LIFETIME, Duration::from_secs);

    PgPoolOptions::new()
        .max_connections(config.pool_size)
        .min_connections(min_connections)
        .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
        .max_lifetime(max_lifetime)
        .idle_timeout(config.idle_timeout_ms.map(Duration::from_millis))
}

/// Validates `config` and opens a pool on it.
///
/// # Errors
///
/// Returns `PostgresError::Config` for an invalid configuration and
/// `PostgresError::Connection` if the server cannot be reached.
#[instrument(skip(config), fields(url = %redact_url(&config.url)))]
pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    config.validate()?;

    info!(
        pool_size = config.pool_size,
        connect_timeout_ms = config.connect_timeout_ms,
        "Opening PostgreSQL pool"
    );
    let pool = pool_options(config).connect(&config.url).await?;
    debug!(idle = pool.num_idle(), "PostgreSQL pool ready");
    Ok(pool)
}

/// Round-trips a trivial statement.
#[instrument(skip(pool))]
pub async fn test_connection(pool: &PgPool) -> Result<()> {
    sqlx_core::query::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Replaces the password of a connection URL with `****`.
pub(crate) fn redact_url(url: &str) -> String {
    let authority_start = url.find("://").map_or(0, |i| i + 3);
    let Some(at) = url[authority_start..].find('@').map(|i| i + authority_start) else {
        return url.to_string();
    };
    match url[authority_start..at].find(':') {
        Some(colon) => {
            let user_end = authority_start + colon;
            format!("{}:****{}", &url[..user_end], &url[at..])
        }
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PostgresError;

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("postgres://authstore:s3cret@db:5432/authstore"),
            "postgres://authstore:****@db:5432/authstore"
        );
        assert_eq!(redact_url("postgres://db/authstore"), "postgres://db/authstore");
        assert_eq!(
            redact_url("postgres://authstore@db/authstore"),
            "postgres://authstore@db/authstore"
        );
    }

    #[test]
    fn test_pool_options_follow_config() {
        let config = PostgresConfig::new("postgres://db/authstore")
            .with_pool_size(8)
            .with_idle_timeout_ms(None)
            .with_max_lifetime_secs(Some(60));
        let options = pool_options(&config);

        assert_eq!(options.get_max_connections(), 8);
        assert_eq!(options.get_min_connections(), 2);
        assert_eq!(options.get_max_lifetime(), Some(Duration::from_secs(60)));
        assert_eq!(options.get_idle_timeout(), None);
    }

    #[test]
    fn test_min_connections_never_exceed_pool() {
        let config = PostgresConfig::new("postgres://db/authstore")
            .with_pool_size(2)
            .with_min_connections(Some(5));
        assert_eq!(pool_options(&config).get_min_connections(), 2);

        let small = PostgresConfig::new("postgres://db/authstore").with_pool_size(1);
        assert_eq!(pool_options(&small).get_min_connections(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_connecting() {
        let config = PostgresConfig::new("postgres://db/authstore").with_pool_size(0);
        let err = create_pool(&config).await.unwrap_err();
        assert!(matches!(err, PostgresError::Config { .. }));
    }
}
