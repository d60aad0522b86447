//! Typed S3 backend configuration
//!
//! [`S3BackendConfig::from_attributes`] turns validated attributes into the
//! settings used to build the AWS clients: defaults are applied, environment
//! variables fill unset attributes, and deprecated attributes are mapped onto
//! their replacements.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::alphabet;
use base64::engine::GeneralPurpose;
use base64::engine::general_purpose::{PAD, STANDARD};
use md5::{Digest, Md5};
use strata_core::diagnostics::{AttributePath, Diagnostic, Diagnostics};
use strata_core::resource::Value;

use super::duration::parse_duration;
use super::region::{convert_region_value, validate_region};
use crate::backend::{BackendConfig, string_map, string_set};
use crate::env::Environment;

/// Prefix for non-default workspace state paths
pub const DEFAULT_WORKSPACE_KEY_PREFIX: &str = "env:";

/// Retries for AWS API requests when `max_retries` is unset
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Length of a base64-encoded 256-bit key
const CUSTOMER_KEY_ENCODED_LEN: usize = 44;

/// Standard base64 that ignores non-zero bits after the last encoded byte
const LENIENT_BASE64: GeneralPurpose =
    GeneralPurpose::new(&alphabet::STANDARD, PAD.with_decode_allow_trailing_bits(true));

/// Wrapper that keeps a value out of `Debug` output
#[derive(Clone, PartialEq, Eq)]
pub struct Sensitive<T>(pub T);

impl<T> Sensitive<T> {
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(sensitive)")
    }
}

/// Key for server-side encryption with customer-provided keys (SSE-C)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerKey(Sensitive<Vec<u8>>);

impl CustomerKey {
    /// Decode a base64 key; the encoded form must be 44 characters long
    pub fn decode(encoded: &str) -> Result<Self, String> {
        if encoded.len() != CUSTOMER_KEY_ENCODED_LEN {
            return Err(format!(
                "must be {} characters in length",
                CUSTOMER_KEY_ENCODED_LEN
            ));
        }
        LENIENT_BASE64
            .decode(encoded)
            .map(|bytes| Self(Sensitive(bytes)))
            .map_err(|e| format!("must be base64 encoded: {}", e))
    }

    /// The key, base64 encoded, as sent in request headers
    pub fn encoded(&self) -> String {
        STANDARD.encode(self.0.expose())
    }

    /// Base64-encoded MD5 digest of the key
    pub fn md5(&self) -> String {
        STANDARD.encode(Md5::digest(self.0.expose()).as_slice())
    }
}

/// Custom service endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoints {
    pub s3: Option<String>,
    pub dynamodb: Option<String>,
    pub iam: Option<String>,
    pub sts: Option<String>,
}

/// Whether credentials may be fetched from the EC2 instance metadata service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetadataService {
    #[default]
    Unspecified,
    Enabled,
    Disabled,
}

/// Role to assume after the base credentials are resolved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssumeRole {
    pub role_arn: String,
    pub duration: Option<Duration>,
    pub external_id: Option<String>,
    pub policy: Option<String>,
    pub policy_arns: Vec<String>,
    pub session_name: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub transitive_tag_keys: Vec<String>,
}

/// Settings of a configured S3 backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3BackendConfig {
    pub bucket: String,
    pub key: String,
    /// Region from the configuration, else from `AWS_REGION`/`AWS_DEFAULT_REGION`
    pub region: Option<String>,
    pub workspace_key_prefix: String,
    pub encrypt: bool,
    pub acl: Option<String>,
    pub kms_key_id: Option<String>,
    pub customer_key: Option<CustomerKey>,
    pub dynamodb_table: Option<String>,

    pub access_key: Option<String>,
    pub secret_key: Option<Sensitive<String>>,
    pub token: Option<Sensitive<String>>,
    pub profile: Option<String>,
    pub shared_credentials_files: Vec<String>,
    pub shared_config_files: Vec<String>,
    pub assume_role: Option<AssumeRole>,

    pub endpoints: Endpoints,
    pub force_path_style: Option<bool>,
    pub max_retries: u32,
    pub use_legacy_workflow: bool,
    pub skip_credentials_validation: bool,
    pub metadata_service: MetadataService,

    pub allowed_account_ids: Vec<String>,
    pub forbidden_account_ids: Vec<String>,
}

impl S3BackendConfig {
    /// Build the typed configuration.
    ///
    /// The attributes are expected to have passed `prepare_config`. Problems
    /// that can only be detected here (unknown region, malformed SSE-C key)
    /// are returned as error diagnostics alongside the configuration.
    pub fn from_attributes(config: &BackendConfig, env: &dyn Environment) -> (Self, Diagnostics) {
        let mut diags = Diagnostics::new();
        let string = |name: &str| config.get_string(name).map(str::to_string);

        let region = match config.get_string("region").filter(|r| !r.is_empty()) {
            Some(region) => {
                let region = convert_region_value(region);
                if !config.get_bool_or("skip_region_validation", false)
                    && let Err(e) = validate_region(&region)
                {
                    diags.push(Diagnostic::attribute_error(
                        AttributePath::attr("region"),
                        "Invalid region value",
                        e,
                    ));
                }
                Some(region)
            }
            None => env.first_var(&["AWS_REGION", "AWS_DEFAULT_REGION"]),
        };

        let customer_key = match config.get_string("sse_customer_key") {
            Some(encoded) => match CustomerKey::decode(encoded) {
                Ok(key) => Some(key),
                Err(e) => {
                    diags.push(Diagnostic::attribute_error(
                        AttributePath::attr("sse_customer_key"),
                        "Invalid sse_customer_key value",
                        format!("sse_customer_key {}", e),
                    ));
                    None
                }
            },
            None => match env.var("AWS_SSE_CUSTOMER_KEY") {
                Some(encoded) => match CustomerKey::decode(&encoded) {
                    Ok(key) => Some(key),
                    Err(e) => {
                        diags.push(Diagnostic::error(
                            "Invalid AWS_SSE_CUSTOMER_KEY value",
                            format!(r#"The environment variable "AWS_SSE_CUSTOMER_KEY" {}"#, e),
                        ));
                        None
                    }
                },
                None => None,
            },
        };

        let assume_role = if let Some(block) = config.get_object("assume_role") {
            let (role, role_diags) = nested_assume_role(block);
            diags.extend(role_diags);
            Some(role)
        } else if config.is_set("role_arn") {
            Some(legacy_assume_role(config))
        } else {
            None
        };

        let shared_credentials_files = config
            .get_string_set("shared_credentials_files")
            .or_else(|| env.var("AWS_SHARED_CREDENTIALS_FILE").map(|f| vec![f]))
            .or_else(|| string("shared_credentials_file").map(|f| vec![f]))
            .unwrap_or_default();
        let shared_config_files = config
            .get_string_set("shared_config_files")
            .or_else(|| env.var("AWS_SHARED_CONFIG_FILE").map(|f| vec![f]))
            .unwrap_or_default();

        let endpoints = Endpoints {
            s3: string("endpoint")
                .or_else(|| env.first_var(&["AWS_S3_ENDPOINT", "AWS_ENDPOINT_URL_S3"])),
            dynamodb: string("dynamodb_endpoint").or_else(|| {
                env.first_var(&["AWS_DYNAMODB_ENDPOINT", "AWS_ENDPOINT_URL_DYNAMODB"])
            }),
            iam: string("iam_endpoint").or_else(|| env.var("AWS_IAM_ENDPOINT")),
            sts: string("sts_endpoint").or_else(|| env.var("AWS_STS_ENDPOINT")),
        };

        let metadata_service = match config.get_bool("skip_metadata_api_check") {
            Some(true) => MetadataService::Disabled,
            Some(false) => MetadataService::Enabled,
            None => MetadataService::Unspecified,
        };

        let max_retries = config
            .get_int("max_retries")
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);

        let backend = Self {
            bucket: string("bucket").unwrap_or_default(),
            key: string("key").unwrap_or_default(),
            region,
            workspace_key_prefix: string("workspace_key_prefix")
                .unwrap_or_else(|| DEFAULT_WORKSPACE_KEY_PREFIX.to_string()),
            encrypt: config.get_bool_or("encrypt", false),
            acl: string("acl").filter(|s| !s.is_empty()),
            kms_key_id: string("kms_key_id").filter(|s| !s.is_empty()),
            customer_key,
            dynamodb_table: string("dynamodb_table").filter(|s| !s.is_empty()),
            access_key: string("access_key"),
            secret_key: string("secret_key").map(Sensitive),
            token: string("token").map(Sensitive),
            profile: string("profile"),
            shared_credentials_files,
            shared_config_files,
            assume_role,
            endpoints,
            force_path_style: config.get_bool("force_path_style"),
            max_retries,
            use_legacy_workflow: config.get_bool_or("use_legacy_workflow", true),
            skip_credentials_validation: config.get_bool_or("skip_credentials_validation", false),
            metadata_service,
            allowed_account_ids: config.get_string_set("allowed_account_ids").unwrap_or_default(),
            forbidden_account_ids: config
                .get_string_set("forbidden_account_ids")
                .unwrap_or_default(),
        };

        (backend, diags)
    }
}

fn nested_assume_role(block: &HashMap<String, Value>) -> (AssumeRole, Diagnostics) {
    let mut diags = Diagnostics::new();
    let string = |name: &str| block.get(name).and_then(Value::as_str).map(str::to_string);

    let duration = match block.get("duration").and_then(Value::as_str) {
        Some(raw) => match parse_duration(raw) {
            Ok(d) => Some(d),
            Err(e) => {
                diags.push(Diagnostic::attribute_error(
                    AttributePath::attr("assume_role").child("duration"),
                    "Invalid Duration",
                    e,
                ));
                None
            }
        },
        None => None,
    };

    let role = AssumeRole {
        role_arn: string("role_arn").unwrap_or_default(),
        duration,
        external_id: string("external_id"),
        policy: string("policy").map(|p| p.trim().to_string()),
        policy_arns: block.get("policy_arns").and_then(string_set).unwrap_or_default(),
        session_name: string("session_name"),
        tags: block
            .get("tags")
            .and_then(string_map)
            .map(|m| m.into_iter().collect())
            .unwrap_or_default(),
        transitive_tag_keys: block
            .get("transitive_tag_keys")
            .and_then(string_set)
            .unwrap_or_default(),
    };
    (role, diags)
}

fn legacy_assume_role(config: &BackendConfig) -> AssumeRole {
    let string = |name: &str| config.get_string(name).map(str::to_string);

    AssumeRole {
        role_arn: string("role_arn").unwrap_or_default(),
        duration: config
            .get_int("assume_role_duration_seconds")
            .and_then(|secs| u64::try_from(secs).ok())
            .map(Duration::from_secs),
        external_id: string("external_id"),
        policy: string("assume_role_policy"),
        policy_arns: config
            .get_string_set("assume_role_policy_arns")
            .unwrap_or_default(),
        session_name: string("session_name"),
        tags: config
            .get_string_map("assume_role_tags")
            .map(|m| m.into_iter().collect())
            .unwrap_or_default(),
        transitive_tag_keys: config
            .get_string_set("assume_role_transitive_tag_keys")
            .unwrap_or_default(),
    }
}
