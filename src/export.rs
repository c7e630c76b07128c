//! One export run, end to end

use crate::api::{ApiClient, Session};
use crate::auth::{Credentials, TokenProvider};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::paths::PathMapper;
use crate::report::RunReport;
use crate::scheduler::{DownloadOptions, DownloadScheduler};
use crate::walker::TreeWalker;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Exports Filevine projects to a local directory
///
/// A run has two sequential phases: the whole folder tree is listed first,
/// then documents are downloaded by the worker pool.
pub struct Exporter {
    config: Config,
    client: Arc<ApiClient>,
}

impl Exporter {
    /// Validate `config` and build the HTTP stack
    pub fn new(config: Config, credentials: Credentials) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("filevine-dl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let tokens = Arc::new(TokenProvider::new(http.clone(), &config.api, credentials));
        let client = Arc::new(ApiClient::new(http, &config, tokens)?);

        Ok(Self { config, client })
    }

    /// The configuration this exporter runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Exchange credentials and resolve the session, without touching a project
    pub async fn check_connection(&self) -> Result<Session> {
        self.client.tokens().get_token().await?;
        self.client.resolve_session().await
    }

    /// Mirror `project_id` under `dest`
    ///
    /// Returns a report even when some documents or folders failed. Errors
    /// are reserved for authentication failures, a root listing failure and
    /// a destination root that cannot be created.
    pub async fn export(
        &self,
        project_id: &str,
        dest: &Path,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        let session = self.client.resolve_session().await?;
        tracing::info!(
            project_id,
            org_id = %session.org_id,
            dest = %dest.display(),
            "Starting export"
        );

        let tree = TreeWalker::new(self.client.as_ref(), cancel.clone())
            .build_tree(project_id)
            .await?;

        let dest = std::path::absolute(dest).map_err(|source| Error::Destination {
            path: dest.to_path_buf(),
            source,
        })?;
        let options = DownloadOptions::from(&self.config.download);
        if !options.dry_run {
            tokio::fs::create_dir_all(&dest)
                .await
                .map_err(|source| Error::Destination {
                    path: dest.clone(),
                    source,
                })?;
        }

        let mapper = PathMapper::new(&dest, &tree, self.config.download.case_insensitive_names);
        DownloadScheduler::new(self.client.clone())
            .run(Arc::new(tree), Arc::new(mapper), &options, cancel)
            .await
    }
}
