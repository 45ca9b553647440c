//! TDS connector and session backed by `tiberius`.

use async_trait::async_trait;
use std::time::Duration;
use tiberius::{AuthMethod, Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use super::queries;
use crate::database::{
    domain::{DatabaseIdentity, DatabaseName, DdlStatement, LiveRecord},
    ports::{SqlError, SqlResult, SqlServerConnector, SqlSession, ServerTarget},
};

/// Opens one TDS connection per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiberiusConnector {
    connect_timeout: Duration,
    trust_server_certificate: bool,
}

impl TiberiusConnector {
    /// Creates a connector that verifies the server certificate.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            trust_server_certificate: false,
        }
    }

    /// Accepts any server certificate.
    ///
    /// Managed-instance endpoints inside a cluster usually present a
    /// self-signed certificate.
    #[must_use]
    pub const fn trusting_server_certificate(mut self) -> Self {
        self.trust_server_certificate = true;
        self
    }

    fn config_for(&self, target: &ServerTarget, host: &str, port: u16) -> Config {
        let mut config = Config::new();
        config.host(host);
        config.port(port);
        config.authentication(AuthMethod::sql_server(
            target.credentials.username(),
            target.credentials.password(),
        ));
        if self.trust_server_certificate {
            config.trust_cert();
        }
        config
    }

    async fn open_stream(&self, config: &Config, endpoint: &str) -> SqlResult<TcpStream> {
        let tcp = tokio::time::timeout(self.connect_timeout, TcpStream::connect(config.get_addr()))
            .await
            .map_err(|err| SqlError::connection(endpoint, err))?
            .map_err(|err| SqlError::connection(endpoint, err))?;
        tcp.set_nodelay(true)
            .map_err(|err| SqlError::connection(endpoint, err))?;
        Ok(tcp)
    }
}

#[async_trait]
impl SqlServerConnector for TiberiusConnector {
    type Session = TiberiusSession;

    async fn connect(&self, target: &ServerTarget) -> SqlResult<Self::Session> {
        let endpoint = target.endpoint();
        let config = self.config_for(target, &target.host, target.port);
        let tcp = self.open_stream(&config, &endpoint).await?;
        debug!(endpoint = %endpoint, "opening SQL Server session");

        let client = match Client::connect(config, tcp.compat_write()).await {
            Ok(client) => client,
            Err(tiberius::error::Error::Routing { host, port }) => {
                debug!(endpoint = %endpoint, redirect = %format!("{host}:{port}"), "following server redirect");
                let redirected = self.config_for(target, &host, port);
                let redirected_tcp = self.open_stream(&redirected, &endpoint).await?;
                Client::connect(redirected, redirected_tcp.compat_write())
                    .await
                    .map_err(|err| SqlError::connection(&endpoint, err))?
            }
            Err(err) => return Err(SqlError::connection(&endpoint, err)),
        };
        Ok(TiberiusSession { client })
    }
}

/// One TDS connection; closed when dropped.
pub struct TiberiusSession {
    client: Client<Compat<TcpStream>>,
}

impl std::fmt::Debug for TiberiusSession {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("TiberiusSession").finish_non_exhaustive()
    }
}

impl TiberiusSession {
    async fn query_one<T>(
        &mut self,
        sql: &'static str,
        argument: &str,
        decode: impl FnOnce(&tiberius::Row) -> SqlResult<T> + Send,
    ) -> SqlResult<Option<T>> {
        let row = self
            .client
            .query(sql, &[&argument])
            .await
            .map_err(SqlError::query)?
            .into_row()
            .await
            .map_err(SqlError::query)?;
        row.as_ref().map(decode).transpose()
    }
}

#[async_trait]
impl SqlSession for TiberiusSession {
    async fn execute(&mut self, statement: &DdlStatement) -> SqlResult<()> {
        self.client
            .simple_query(statement.to_sql())
            .await
            .map_err(|err| SqlError::statement(statement, err))?
            .into_results()
            .await
            .map_err(|err| SqlError::statement(statement, err))?;
        Ok(())
    }

    async fn database_exists(&mut self, name: &DatabaseName) -> SqlResult<bool> {
        let exists = self
            .query_one(queries::DATABASE_EXISTS, name.as_str(), queries::exists)
            .await?;
        Ok(exists.unwrap_or(false))
    }

    async fn find_identity_by_name(
        &mut self,
        name: &DatabaseName,
    ) -> SqlResult<Option<DatabaseIdentity>> {
        self.query_one(queries::IDENTITY_BY_NAME, name.as_str(), queries::identity)
            .await
    }

    async fn find_name_by_identity(
        &mut self,
        identity: DatabaseIdentity,
    ) -> SqlResult<Option<String>> {
        let argument = identity.to_string();
        self.query_one(queries::NAME_BY_IDENTITY, &argument, queries::name)
            .await
    }

    async fn fetch_live_record(&mut self, name: &DatabaseName) -> SqlResult<Option<LiveRecord>> {
        self.query_one(queries::LIVE_RECORD, name.as_str(), queries::live_record)
            .await
    }
}
