//! S3 backend for state storage
//!
//! State objects live in a single bucket. The default workspace is stored at
//! `key`; every other workspace `w` at `<workspace_key_prefix>/<w>/<key>`.
//! When `dynamodb_table` is set, the table holds both the state locks and an
//! MD5 digest of each state object for consistency checks.

mod client;
mod config;
mod duration;
mod region;
mod schema;
mod validate;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ObjectCannedAcl, ServerSideEncryption};
use md5::{Digest, Md5};
use strata_core::diagnostics::Diagnostics;
use strata_core::schema::BlockSchema;

use crate::backend::{BackendConfig, BackendError, BackendResult, DEFAULT_WORKSPACE, StateBackend};
use crate::env::Environment;
use crate::lock::LockInfo;
use crate::state::StateFile;

pub use client::{S3Clients, build_clients, verify_account_id};
pub use config::{
    AssumeRole, CustomerKey, DEFAULT_MAX_RETRIES, DEFAULT_WORKSPACE_KEY_PREFIX, Endpoints,
    MetadataService, S3BackendConfig, Sensitive,
};

/// Algorithm name for SSE-C requests
const SSE_CUSTOMER_ALGORITHM: &str = "AES256";

/// Attempts made to read state whose digest does not match yet
const CONSISTENCY_ATTEMPTS: u32 = 5;
const CONSISTENCY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// S3-based state backend
pub struct S3Backend {
    config: S3BackendConfig,
    s3: aws_sdk_s3::Client,
    dynamodb: aws_sdk_dynamodb::Client,
}

impl S3Backend {
    /// Attributes accepted by the backend
    pub fn config_schema() -> BlockSchema {
        schema::config_schema()
    }

    /// Validate raw attributes without building anything
    pub fn prepare_config(config: &BackendConfig, env: &dyn Environment) -> Diagnostics {
        validate::prepare_config(config, env)
    }

    /// Validate the configuration and build the AWS clients.
    ///
    /// Warnings are returned alongside the backend; any error diagnostic
    /// fails with [`BackendError::InvalidConfiguration`].
    pub async fn configure(
        config: &BackendConfig,
        env: &dyn Environment,
    ) -> BackendResult<(Self, Diagnostics)> {
        let mut diags = validate::prepare_config(config, env);
        if diags.has_errors() {
            return Err(BackendError::InvalidConfiguration(diags));
        }

        let (typed, typed_diags) = S3BackendConfig::from_attributes(config, env);
        diags.extend(typed_diags);
        if diags.has_errors() {
            return Err(BackendError::InvalidConfiguration(diags));
        }

        let (clients, client_diags) = build_clients(&typed, env).await;
        diags.extend(client_diags);
        let clients = match clients {
            Some(clients) if !diags.has_errors() => clients,
            _ => return Err(BackendError::InvalidConfiguration(diags)),
        };

        for warning in diags.warnings() {
            log::warn!("{}", warning);
        }

        Ok((
            Self {
                config: typed,
                s3: clients.s3,
                dynamodb: clients.dynamodb,
            },
            diags,
        ))
    }

    /// The typed configuration the backend was built from
    pub fn config(&self) -> &S3BackendConfig {
        &self.config
    }

    fn path(&self, workspace: &str) -> String {
        state_path(&self.config.key, &self.config.workspace_key_prefix, workspace)
    }

    /// Lock table key for a state object
    fn lock_id(&self, path: &str) -> String {
        format!("{}/{}", self.config.bucket, path)
    }

    fn digest_id(&self, path: &str) -> String {
        format!("{}-md5", self.lock_id(path))
    }

    async fn get_object(&self, path: &str) -> BackendResult<Option<Vec<u8>>> {
        let mut request = self.s3.get_object().bucket(&self.config.bucket).key(path);
        if let Some(key) = &self.config.customer_key {
            request = request
                .sse_customer_algorithm(SSE_CUSTOMER_ALGORITHM)
                .sse_customer_key(key.encoded())
                .sse_customer_key_md5(key.md5());
        }

        match request.send().await {
            Ok(output) => {
                let body = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| BackendError::Io(e.to_string()))?;
                Ok(Some(body.into_bytes().to_vec()))
            }
            Err(err) if is_not_found_error(&err) => Ok(None),
            Err(err) => Err(BackendError::Aws(err.to_string())),
        }
    }

    async fn put_object(&self, path: &str, body: Vec<u8>) -> BackendResult<()> {
        let mut request = self
            .s3
            .put_object()
            .bucket(&self.config.bucket)
            .key(path)
            .body(ByteStream::from(body))
            .content_type("application/json");

        request = match object_encryption(&self.config) {
            ObjectEncryption::CustomerKey(key) => request
                .sse_customer_algorithm(SSE_CUSTOMER_ALGORITHM)
                .sse_customer_key(key.encoded())
                .sse_customer_key_md5(key.md5()),
            ObjectEncryption::Kms(kms_key_id) => request
                .server_side_encryption(ServerSideEncryption::AwsKms)
                .ssekms_key_id(kms_key_id),
            ObjectEncryption::Aes256 => {
                request.server_side_encryption(ServerSideEncryption::Aes256)
            }
            ObjectEncryption::None => request,
        };
        if let Some(acl) = &self.config.acl {
            request = request.acl(ObjectCannedAcl::from(acl.as_str()));
        }

        request
            .send()
            .await
            .map_err(|e| BackendError::Aws(e.to_string()))?;
        Ok(())
    }

    async fn get_item(
        &self,
        table: &str,
        lock_id: &str,
    ) -> BackendResult<Option<HashMap<String, AttributeValue>>> {
        let output = self
            .dynamodb
            .get_item()
            .table_name(table)
            .key("LockID", AttributeValue::S(lock_id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| BackendError::Aws(e.to_string()))?;
        Ok(output.item)
    }

    async fn stored_digest(&self, path: &str) -> BackendResult<Option<String>> {
        let Some(table) = &self.config.dynamodb_table else {
            return Ok(None);
        };
        let item = self.get_item(table, &self.digest_id(path)).await?;
        Ok(item
            .as_ref()
            .and_then(|item| item.get("Digest"))
            .and_then(|value| value.as_s().ok())
            .filter(|digest| !digest.is_empty())
            .cloned())
    }

    async fn put_digest(&self, path: &str, digest: String) -> BackendResult<()> {
        let Some(table) = &self.config.dynamodb_table else {
            return Ok(());
        };
        self.dynamodb
            .put_item()
            .table_name(table)
            .item("LockID", AttributeValue::S(self.digest_id(path)))
            .item("Digest", AttributeValue::S(digest))
            .send()
            .await
            .map_err(|e| BackendError::Aws(e.to_string()))?;
        Ok(())
    }

    async fn delete_digest(&self, path: &str) -> BackendResult<()> {
        let Some(table) = &self.config.dynamodb_table else {
            return Ok(());
        };
        self.dynamodb
            .delete_item()
            .table_name(table)
            .key("LockID", AttributeValue::S(self.digest_id(path)))
            .send()
            .await
            .map_err(|e| BackendError::Aws(e.to_string()))?;
        Ok(())
    }

    /// Read the lock currently held on a state object
    async fn read_lock(&self, table: &str, path: &str) -> BackendResult<Option<StoredLock>> {
        let item = self.get_item(table, &self.lock_id(path)).await?;
        item.as_ref().map_or(Ok(None), stored_lock)
    }

    async fn unlock(&self, workspace: &str, lock_id: &str) -> BackendResult<()> {
        let path = self.path(workspace);
        let Some(table) = &self.config.dynamodb_table else {
            log::info!("locking is disabled; nothing to unlock for {}", path);
            return Ok(());
        };

        let existing = self
            .read_lock(table, &path)
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock_id.to_string()))?;
        if existing.lock.id != lock_id {
            return Err(BackendError::LockMismatch {
                expected: lock_id.to_string(),
                actual: existing.lock.id,
            });
        }

        // Guard on the stored text, which another client may have written in
        // a layout that re-serializing the parsed lock would not reproduce.
        self.dynamodb
            .delete_item()
            .table_name(table)
            .key("LockID", AttributeValue::S(self.lock_id(&path)))
            .condition_expression("Info = :info")
            .expression_attribute_values(":info", AttributeValue::S(existing.raw))
            .send()
            .await
            .map_err(|e| BackendError::Aws(e.to_string()))?;

        log::debug!("released lock {} on {}", lock_id, path);
        Ok(())
    }
}

#[async_trait]
impl StateBackend for S3Backend {
    async fn workspaces(&self) -> BackendResult<Vec<String>> {
        let prefix = &self.config.workspace_key_prefix;
        let mut request = self.s3.list_objects_v2().bucket(&self.config.bucket);
        if !prefix.is_empty() {
            request = request.prefix(format!("{}/", prefix));
        }

        let mut workspaces = Vec::new();
        let mut pages = request.into_paginator().send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| BackendError::Aws(e.to_string()))?;
            for object in page.contents() {
                if let Some(name) = object
                    .key()
                    .and_then(|k| workspace_from_key(k, &self.config.key, prefix))
                {
                    workspaces.push(name);
                }
            }
        }

        Ok(sort_workspaces(workspaces))
    }

    async fn delete_workspace(&self, workspace: &str) -> BackendResult<()> {
        if workspace == DEFAULT_WORKSPACE || workspace.is_empty() {
            return Err(BackendError::Workspace(
                "can't delete default state".to_string(),
            ));
        }

        let path = self.path(workspace);
        self.s3
            .delete_object()
            .bucket(&self.config.bucket)
            .key(&path)
            .send()
            .await
            .map_err(|e| BackendError::Aws(e.to_string()))?;
        self.delete_digest(&path).await?;

        log::info!("deleted workspace {} ({})", workspace, path);
        Ok(())
    }

    async fn read_state(&self, workspace: &str) -> BackendResult<Option<StateFile>> {
        let path = self.path(workspace);
        let expected = self.stored_digest(&path).await?;

        let mut attempt = 1;
        let body = loop {
            let body = self.get_object(&path).await?;
            let Some(expected) = &expected else {
                break body;
            };
            let Err(actual) = check_digest(expected, body.as_deref()) else {
                break body;
            };
            if attempt >= CONSISTENCY_ATTEMPTS {
                return Err(BackendError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
            log::debug!(
                "state digest mismatch for {} (attempt {}), retrying",
                path,
                attempt
            );
            attempt += 1;
            tokio::time::sleep(CONSISTENCY_POLL_INTERVAL).await;
        };

        match body {
            Some(bytes) if !bytes.is_empty() => StateFile::from_bytes(&bytes)
                .map(Some)
                .map_err(|e| BackendError::InvalidState(e.to_string())),
            _ => Ok(None),
        }
    }

    async fn write_state(&self, workspace: &str, state: &StateFile) -> BackendResult<()> {
        let path = self.path(workspace);
        let body = state
            .to_bytes()
            .map_err(|e| BackendError::Serialization(e.to_string()))?;
        let digest = md5_hex(&body);

        self.put_object(&path, body).await?;
        self.put_digest(&path, digest).await?;

        log::debug!("wrote state serial {} to {}", state.serial, path);
        Ok(())
    }

    async fn acquire_lock(&self, workspace: &str, operation: &str) -> BackendResult<LockInfo> {
        let path = self.path(workspace);
        let lock = LockInfo::new(operation).with_path(self.lock_id(&path));

        let Some(table) = &self.config.dynamodb_table else {
            log::info!("locking is disabled; no dynamodb_table configured");
            return Ok(lock);
        };

        let info = lock
            .to_json()
            .map_err(|e| BackendError::Serialization(e.to_string()))?;
        let result = self
            .dynamodb
            .put_item()
            .table_name(table)
            .item("LockID", AttributeValue::S(self.lock_id(&path)))
            .item("Info", AttributeValue::S(info))
            .condition_expression("attribute_not_exists(LockID)")
            .send()
            .await;

        match result {
            Ok(_) => {
                log::debug!("acquired lock {} on {}", lock.id, path);
                Ok(lock)
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                match self.read_lock(table, &path).await? {
                    Some(existing) => Err(BackendError::locked(&existing.lock)),
                    None => Err(BackendError::Aws(err.to_string())),
                }
            }
            Err(err) => Err(BackendError::Aws(err.to_string())),
        }
    }

    async fn release_lock(&self, workspace: &str, lock: &LockInfo) -> BackendResult<()> {
        self.unlock(workspace, &lock.id).await
    }

    async fn force_unlock(&self, workspace: &str, lock_id: &str) -> BackendResult<()> {
        self.unlock(workspace, lock_id).await
    }
}

/// Object key of a workspace's state
fn state_path(key: &str, prefix: &str, workspace: &str) -> String {
    if workspace == DEFAULT_WORKSPACE {
        return key.to_string();
    }
    if prefix.is_empty() {
        format!("{}/{}", workspace, key)
    } else {
        format!("{}/{}/{}", prefix, workspace, key)
    }
}

/// Workspace name of an object key, if the key is a workspace state path
fn workspace_from_key(object_key: &str, key: &str, prefix: &str) -> Option<String> {
    let rest = if prefix.is_empty() {
        object_key
    } else {
        object_key.strip_prefix(prefix)?.strip_prefix('/')?
    };
    let (workspace, state_key) = rest.split_once('/')?;
    (!workspace.is_empty() && state_key == key).then(|| workspace.to_string())
}

/// Default workspace first, the rest sorted and deduplicated
fn sort_workspaces(mut workspaces: Vec<String>) -> Vec<String> {
    workspaces.retain(|w| w != DEFAULT_WORKSPACE);
    workspaces.sort();
    workspaces.dedup();
    workspaces.insert(0, DEFAULT_WORKSPACE.to_string());
    workspaces
}

/// Server-side encryption applied to written state objects
#[derive(Debug, PartialEq)]
enum ObjectEncryption<'a> {
    CustomerKey(&'a CustomerKey),
    Kms(&'a str),
    Aes256,
    None,
}

/// A customer key wins over `encrypt`; with `encrypt`, a KMS key selects `aws:kms`
fn object_encryption(config: &S3BackendConfig) -> ObjectEncryption<'_> {
    if let Some(key) = &config.customer_key {
        return ObjectEncryption::CustomerKey(key);
    }
    if !config.encrypt {
        return ObjectEncryption::None;
    }
    match &config.kms_key_id {
        Some(kms_key_id) => ObjectEncryption::Kms(kms_key_id),
        None => ObjectEncryption::Aes256,
    }
}

/// A lock item's parsed `Info` together with the text it was parsed from
#[derive(Debug)]
struct StoredLock {
    lock: LockInfo,
    raw: String,
}

fn stored_lock(item: &HashMap<String, AttributeValue>) -> BackendResult<Option<StoredLock>> {
    let Some(raw) = item.get("Info").and_then(|value| value.as_s().ok()) else {
        return Ok(None);
    };
    let lock = LockInfo::from_json(raw).map_err(|e| BackendError::Serialization(e.to_string()))?;
    Ok(Some(StoredLock {
        lock,
        raw: raw.clone(),
    }))
}

/// Compare an object body with its recorded digest.
///
/// Returns the body's digest on mismatch; a missing object never matches.
fn check_digest(expected: &str, body: Option<&[u8]>) -> Result<(), String> {
    let actual = body.map(md5_hex).unwrap_or_default();
    if actual == expected {
        Ok(())
    } else {
        Err(actual)
    }
}

fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data).as_slice())
}

/// Check if an S3 error is a "not found" error
fn is_not_found_error<E>(err: &aws_sdk_s3::error::SdkError<E>) -> bool {
    err.raw_response()
        .is_some_and(|raw| raw.status().as_u16() == 404)
}
