// ABOUTME: SyncEngine - top-level export/import/ping operations over a connection provider
// ABOUTME: Opens one session per call and always releases or discards it before returning

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{ExportRequest, ImportRequest, PingRequest};
use crate::connection::{ConnectionDescriptor, ConnectionProvider};
use crate::error::{Result, SyncError};
use crate::export::{ExportPage, Exporter};
use crate::import::{validate_import, Importer};
use crate::reconcile::{RecordOutcome, STATUS_OK};
use crate::session::Session;
use crate::settings::Settings;

/// Status reported when the connection check fails
pub const STATUS_UNAUTHORIZED: i64 = 401;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub status_code: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<PingError>,
}

impl PingResponse {
    pub fn is_ok(&self) -> bool {
        self.status_code == STATUS_OK
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingError {
    pub code: String,
    pub message: String,
}

/// Runs each operation on a fresh session from `provider`.
pub struct SyncEngine<P: ConnectionProvider> {
    provider: P,
    settings: Settings,
}

impl<P: ConnectionProvider> SyncEngine<P> {
    pub fn new(provider: P, settings: Settings) -> Self {
        Self { provider, settings }
    }

    /// Export one page. The configuration is validated before connecting.
    pub async fn export(&self, request: &ExportRequest) -> Result<ExportPage> {
        let config = request
            .configuration
            .validate(self.settings.engine.default_page_size)?;

        let session = self.connect(&request.connection).await?;
        let result = Exporter::new(&session).export(&config, &request.state).await;
        finish(&session, result).await
    }

    /// Import a batch and return one outcome per record, in input order.
    pub async fn import(&self, request: ImportRequest) -> Result<Vec<RecordOutcome>> {
        let ImportRequest {
            connection,
            configuration,
            post_map_data,
            pre_map_data,
        } = request;
        let (config, batch) = validate_import(&configuration, post_map_data, pre_map_data)?;

        let session = self.connect(&connection).await?;
        let result = Importer::new(&session, self.settings.engine.max_concurrency)
            .import(&config, &batch)
            .await;
        finish(&session, result).await
    }

    /// Check connectivity. Failures are reported in the response, never raised.
    pub async fn ping(&self, request: &PingRequest) -> PingResponse {
        let target = request.connection.display_target();
        let session = match self.provider.connect(&request.connection).await {
            Ok(session) => session,
            Err(err) => {
                warn!("Ping of {} failed to connect: {}", target, err);
                return PingResponse::failed(err.code, err.message);
            }
        };

        match session.ping().await {
            Ok(()) => {
                if let Err(err) = session.release().await {
                    warn!("Failed to close ping session for {}: {}", target, err);
                }
                info!("Ping of {} succeeded", target);
                PingResponse {
                    status_code: STATUS_OK,
                    errors: Vec::new(),
                }
            }
            Err(err) => {
                session.discard().await;
                warn!("Ping of {} failed: {}", target, err);
                PingResponse::failed(err.code, err.message)
            }
        }
    }

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<P::Session> {
        self.provider.connect(descriptor).await.map_err(|err| {
            warn!(
                "Failed to connect to {}: {}",
                descriptor.display_target(),
                err
            );
            SyncError::Connection(err)
        })
    }
}

impl PingResponse {
    fn failed(code: i64, message: String) -> Self {
        Self {
            status_code: STATUS_UNAUTHORIZED,
            errors: vec![PingError {
                code: code.to_string(),
                message,
            }],
        }
    }
}

/// Release the session after success, discard it after failure.
async fn finish<S: Session, T>(session: &S, result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => {
            if let Err(err) = session.release().await {
                warn!("Failed to close session cleanly: {}", err);
            }
        }
        Err(err) => {
            warn!("Operation failed, discarding session: {}", err);
            session.discard().await;
        }
    }
    result
}
