use pkg_client::ClientError;
use pkg_featuregate::FeatureGateError;
use pkg_leaderelection::ElectionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("invalid syncer name: {0}")]
    InvalidSyncerName(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Election(#[from] ElectionError),

    #[error(transparent)]
    FeatureGate(#[from] FeatureGateError),
}
