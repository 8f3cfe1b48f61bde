//! In-process repository server
//!
//! [`RemoteHub`] hosts bare repositories on any storage backend and answers
//! the wire protocol as a [`Transport`], so engines can fetch from and push
//! to it without a network. Repositories live under `/<name>` in the hub's
//! storage and are addressed as `<base_url>/<name>`.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use histkit_core::engine::{EngineError, Result};
use histkit_core::fs::{EngineFs, StorageFs};
use histkit_core::path::resolve_path;
use histkit_core::remote::basic_auth_header;
use histkit_core::storage::FilesApi;
use histkit_core::transport::{
    Headers, Transport, TransportError, TransportRequest, TransportResponse,
};

use crate::config::{CoreSection, RepoConfig};
use crate::object::ObjectId;
use crate::odb::ObjectDb;
use crate::protocol::{
    self, INFO_REFS, PackResponse, RECEIVE_PACK, ReceiveRequest, ReceiveResponse,
    RefAdvertisement, UPLOAD_PACK, UploadRequest, WireObject,
};
use crate::refs::{self, HEADS_PREFIX, Head, RefStore};

/// Server side of one bare repository
pub struct RepositoryServer {
    odb: ObjectDb,
    refs: RefStore,
}

impl RepositoryServer {
    pub fn new(fs: Arc<dyn EngineFs>, git_dir: &str) -> Self {
        Self {
            odb: ObjectDb::new(fs.clone(), git_dir),
            refs: RefStore::new(fs, git_dir),
        }
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.refs.head().await?.is_some())
    }

    pub async fn info_refs(&self) -> Result<RefAdvertisement> {
        let head = match self.refs.head().await? {
            Some(Head::Symbolic(target)) => Some(target),
            _ => None,
        };
        let refs = self.refs.list_with_ids(HEADS_PREFIX).await?.into_iter().collect();
        Ok(RefAdvertisement { head, refs })
    }

    pub async fn upload_pack(&self, request: &UploadRequest) -> Result<PackResponse> {
        let mut known = Vec::new();
        for id in &request.haves {
            if self.odb.contains(id).await? {
                known.push(*id);
            }
        }
        let exclude: HashSet<ObjectId> =
            self.odb.reachable(&known, &HashSet::new()).await?.into_iter().collect();
        let ids = self.odb.reachable(&request.wants, &exclude).await?;

        let mut objects = Vec::with_capacity(ids.len());
        for id in ids {
            objects.push(WireObject::encode(id, &self.odb.read_framed(&id).await?));
        }
        tracing::debug!("upload-pack: sending {} object(s)", objects.len());
        Ok(PackResponse { objects })
    }

    pub async fn receive_pack(&self, request: &ReceiveRequest) -> Result<ReceiveResponse> {
        for object in &request.objects {
            self.odb.write_framed(&object.id, &object.decode()?).await?;
        }

        let mut response = ReceiveResponse {
            ok: true,
            ..Default::default()
        };
        for update in &request.updates {
            let status = self.check_update(update).await?;
            if status == "ok" {
                self.refs.write(&update.name, &update.new).await?;
            } else {
                response.ok = false;
                response.error = Some(format!("{}: {}", update.name, status));
            }
            response.refs.insert(update.name.clone(), status);
        }
        tracing::debug!(
            "receive-pack: {} object(s), {} update(s), ok: {}",
            request.objects.len(),
            request.updates.len(),
            response.ok
        );
        Ok(response)
    }

    async fn check_update(&self, update: &protocol::RefUpdate) -> Result<String> {
        if refs::validate_ref_name(&update.name).is_err() || !update.name.starts_with(HEADS_PREFIX) {
            return Ok("invalid ref name".to_string());
        }
        if !self.odb.contains(&update.new).await? {
            return Ok("missing objects".to_string());
        }
        let current = self.refs.read(&update.name).await?;
        if update.force {
            return Ok("ok".to_string());
        }
        match current {
            None => Ok("ok".to_string()),
            Some(current) if Some(current) != update.old => Ok("stale info".to_string()),
            Some(current) => {
                if self.odb.is_ancestor(&current, &update.new).await? {
                    Ok("ok".to_string())
                } else {
                    Ok("non-fast-forward".to_string())
                }
            }
        }
    }
}

/// Hub of bare repositories served through [`Transport`]
pub struct RemoteHub {
    base_url: String,
    fs: Arc<dyn EngineFs>,
    credentials: Option<(String, String)>,
}

fn response(url: &str, status: u16, message: &str, body: Bytes) -> TransportResponse {
    let mut headers = Headers::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    TransportResponse {
        url: url.to_string(),
        status,
        status_message: message.to_string(),
        headers,
        body,
    }
}

fn error_response(url: &str, status: u16, message: &str) -> TransportResponse {
    response(url, status, message, Bytes::from(message.to_string()))
}

impl RemoteHub {
    pub fn new(base_url: impl Into<String>, files: Arc<dyn FilesApi>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fs: Arc::new(StorageFs::new(files)),
            credentials: None,
        }
    }

    /// Require Basic credentials on every request
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// URL of a hosted repository
    pub fn url(&self, repository: &str) -> String {
        format!("{}/{}", self.base_url, repository.trim_matches('/'))
    }

    fn server(&self, repository: &str) -> RepositoryServer {
        RepositoryServer::new(self.fs.clone(), &resolve_path(&["/", repository]))
    }

    /// Create an empty bare repository whose HEAD points at `default_branch`
    pub async fn create_repository(&self, repository: &str, default_branch: &str) -> Result<()> {
        let git_dir = resolve_path(&["/", repository]);
        let refs = RefStore::new(self.fs.clone(), &git_dir);
        if refs.head().await?.is_some() {
            return Err(EngineError::AlreadyExists(repository.to_string()));
        }
        refs.set_head(&Head::Symbolic(refs::branch_ref(default_branch)))
            .await?;
        let config = RepoConfig {
            core: CoreSection {
                bare: true,
                default_branch: default_branch.to_string(),
            },
            ..Default::default()
        };
        config.save(self.fs.as_ref(), &git_dir).await?;
        tracing::info!("Created repository {}", self.url(repository));
        Ok(())
    }

    /// Commit id of a branch of a hosted repository
    pub async fn branch_head(&self, repository: &str, branch: &str) -> Result<Option<String>> {
        let refs = RefStore::new(self.fs.clone(), &resolve_path(&["/", repository]));
        Ok(refs.read(&refs::branch_ref(branch)).await?.map(|id| id.to_hex()))
    }

    /// Move a branch of a hosted repository, the way an integration on the
    /// server side would
    pub async fn set_branch(&self, repository: &str, branch: &str, commit_id: &str) -> Result<()> {
        let git_dir = resolve_path(&["/", repository]);
        let id = ObjectId::parse(commit_id)?;
        let odb = ObjectDb::new(self.fs.clone(), &git_dir);
        if !odb.contains(&id).await? {
            return Err(EngineError::NotFound(format!("object {}", id)));
        }
        RefStore::new(self.fs.clone(), &git_dir)
            .write(&refs::branch_ref(branch), &id)
            .await
    }

    fn authorized(&self, request: &TransportRequest) -> bool {
        match &self.credentials {
            None => true,
            Some((username, password)) => request
                .headers
                .get("authorization")
                .is_some_and(|value| *value == basic_auth_header(username, password)),
        }
    }

    async fn dispatch(&self, request: &TransportRequest) -> Result<TransportResponse> {
        let url = request.url.as_str();
        let Some(path) = url.strip_prefix(self.base_url.as_str()) else {
            return Ok(error_response(url, 404, "Not Found"));
        };
        let path = path.split('?').next().unwrap_or(path);
        let route = [INFO_REFS, UPLOAD_PACK, RECEIVE_PACK]
            .into_iter()
            .find_map(|action| {
                path.strip_suffix(action)
                    .and_then(|rest| rest.strip_suffix('/'))
                    .map(|repository| (repository, action))
            });
        let Some((repository, action)) = route else {
            return Ok(error_response(url, 404, "Not Found"));
        };

        let server = self.server(repository);
        if !server.exists().await? {
            return Ok(error_response(url, 404, "Repository not found"));
        }

        let body = match (request.method.as_str(), action) {
            ("GET", INFO_REFS) => protocol::encode(&server.info_refs().await?)?,
            ("POST", UPLOAD_PACK) => {
                let req: UploadRequest = protocol::decode(UPLOAD_PACK, &request.body)?;
                protocol::encode(&server.upload_pack(&req).await?)?
            }
            ("POST", RECEIVE_PACK) => {
                let req: ReceiveRequest = protocol::decode(RECEIVE_PACK, &request.body)?;
                protocol::encode(&server.receive_pack(&req).await?)?
            }
            _ => return Ok(error_response(url, 405, "Method Not Allowed")),
        };
        Ok(response(url, 200, "OK", Bytes::from(body)))
    }
}

#[async_trait]
impl Transport for RemoteHub {
    async fn request(&self, request: TransportRequest) -> std::result::Result<TransportResponse, TransportError> {
        if !self.authorized(&request) {
            tracing::debug!("Rejecting unauthenticated request to {}", request.url);
            return Ok(error_response(&request.url, 401, "Unauthorized"));
        }
        match self.dispatch(&request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::error!("Request to {} failed: {}", request.url, e);
                let status = match e {
                    EngineError::Corrupt(_) => 400,
                    EngineError::NotFound(_) => 404,
                    _ => 500,
                };
                Ok(error_response(&request.url, status, &e.to_string()))
            }
        }
    }
}
