//! Fetch and push over the wire protocol

use std::collections::HashSet;

use histkit_core::engine::{EngineError, FetchOptions, FetchResult, PushOptions, PushResult, Result};
use histkit_core::transport::Transport;

use crate::object::ObjectId;
use crate::protocol::{ReceiveRequest, RefUpdate, RemoteClient, UploadRequest, WireObject};
use crate::refs::{branch_ref, remote_ref};
use crate::repository::Repository;

impl Repository {
    /// Ids of every local ref, used to trim what the server sends
    async fn local_tips(&self) -> Result<Vec<ObjectId>> {
        let mut tips: Vec<ObjectId> = self
            .refs
            .list_with_ids("refs")
            .await?
            .into_iter()
            .map(|(_, id)| id)
            .collect();
        tips.sort();
        tips.dedup();
        Ok(tips)
    }

    pub async fn fetch(&self, transport: &dyn Transport, options: FetchOptions) -> Result<FetchResult> {
        let client = RemoteClient::new(transport, &options.url, options.auth.clone());
        let advertised = client.advertise().await?;
        let branch = branch_ref(&options.reference);

        let wanted: Vec<(String, ObjectId)> = if options.single_branch {
            advertised
                .refs
                .get(&branch)
                .map(|id| vec![(branch.clone(), *id)])
                .unwrap_or_default()
        } else {
            advertised.refs.into_iter().collect()
        };
        if wanted.is_empty() {
            tracing::debug!("{} has no branch {}", options.url, options.reference);
            return Ok(FetchResult::default());
        }

        let mut wants = Vec::new();
        for (_, id) in &wanted {
            if !self.odb.contains(id).await? {
                wants.push(*id);
            }
        }

        let mut objects_received = 0;
        if !wants.is_empty() {
            let pack = client
                .upload_pack(&UploadRequest {
                    wants,
                    haves: self.local_tips().await?,
                })
                .await?;
            for object in &pack.objects {
                self.odb.write_framed(&object.id, &object.decode()?).await?;
                objects_received += 1;
            }
        }

        for (name, id) in &wanted {
            if !self.odb.contains(id).await? {
                return Err(EngineError::Corrupt(format!(
                    "{} did not send commit {} of {}",
                    options.url, id, name
                )));
            }
            self.refs.write(&remote_ref(&options.remote, name), id).await?;
        }

        let fetch_head = wanted
            .iter()
            .find(|(name, _)| *name == branch)
            .or_else(|| wanted.first())
            .map(|(_, id)| id.to_hex());
        tracing::debug!(
            "Fetched {} ref(s) from {} ({} object(s))",
            wanted.len(),
            options.url,
            objects_received
        );
        Ok(FetchResult {
            fetch_head,
            objects_received,
        })
    }

    pub async fn push(&self, transport: &dyn Transport, options: PushOptions) -> Result<PushResult> {
        let local_name = branch_ref(&options.reference);
        let local = self
            .refs
            .read(&local_name)
            .await?
            .ok_or_else(|| EngineError::NotFound(options.reference.clone()))?;
        let target = branch_ref(&options.remote_ref);
        let tracking = remote_ref(&options.remote, &target);

        let client = RemoteClient::new(transport, &options.url, options.auth.clone());
        let advertised = client.advertise().await?;
        let old = advertised.refs.get(&target).copied();

        if old == Some(local) {
            self.refs.write(&tracking, &local).await?;
            return Ok(PushResult {
                ok: true,
                refs: [(target, "up-to-date".to_string())].into(),
                error: None,
            });
        }
        if let Some(old) = old {
            if !options.force && !self.odb.is_ancestor(&old, &local).await? {
                return Err(EngineError::PushRejected(format!(
                    "{} -> {}: non-fast-forward",
                    local_name, target
                )));
            }
        }

        let mut known = Vec::new();
        for id in advertised.refs.values() {
            if self.odb.contains(id).await? {
                known.push(*id);
            }
        }
        let exclude: HashSet<ObjectId> = self
            .odb
            .reachable(&known, &HashSet::new())
            .await?
            .into_iter()
            .collect();
        let mut objects = Vec::new();
        for id in self.odb.reachable(&[local], &exclude).await? {
            objects.push(WireObject::encode(id, &self.odb.read_framed(&id).await?));
        }
        tracing::debug!("Sending {} object(s) to {}", objects.len(), options.url);

        let response = client
            .receive_pack(&ReceiveRequest {
                updates: vec![RefUpdate {
                    name: target,
                    old,
                    new: local,
                    force: options.force,
                }],
                objects,
            })
            .await?;
        if response.ok {
            self.refs.write(&tracking, &local).await?;
        }
        Ok(PushResult {
            ok: response.ok,
            refs: response.refs,
            error: response.error,
        })
    }
}
