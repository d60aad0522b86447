//! Validation of S3 backend configuration
//!
//! [`prepare_config`] checks the raw attributes and collects every problem
//! as a diagnostic. It never touches the network.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use strata_core::diagnostics::{AttributePath, Diagnostic, Diagnostics};
use strata_core::resource::Value;

use super::duration::parse_duration;
use super::schema::config_schema;
use crate::backend::{BackendConfig, string_list, string_map};
use crate::env::Environment;

pub(crate) const ENCRYPTION_KEY_CONFLICT: &str = r#"Only one of "kms_key_id" and "sse_customer_key" can be set.

The "kms_key_id" is used for encryption with KMS-Managed Keys (SSE-KMS)
while "sse_customer_key" is used for encryption with customer-managed keys (SSE-C).
Please choose one or the other."#;

pub(crate) const ENCRYPTION_KEY_ENV_CONFLICT: &str = r#"Only one of "kms_key_id" and the environment variable "AWS_SSE_CUSTOMER_KEY" can be set.

The "kms_key_id" is used for encryption with KMS-Managed Keys (SSE-KMS)
while "AWS_SSE_CUSTOMER_KEY" is used for encryption with customer-managed keys (SSE-C).
Please choose one or the other."#;

/// Legacy top-level attributes and their replacement inside `assume_role`
pub(crate) const ASSUME_ROLE_DEPRECATED_FIELDS: &[(&str, &str)] = &[
    ("role_arn", "assume_role.role_arn"),
    ("session_name", "assume_role.session_name"),
    ("external_id", "assume_role.external_id"),
    ("assume_role_duration_seconds", "assume_role.duration"),
    ("assume_role_policy", "assume_role.policy"),
    ("assume_role_policy_arns", "assume_role.policy_arns"),
    ("assume_role_tags", "assume_role.tags"),
    ("assume_role_transitive_tag_keys", "assume_role.transitive_tag_keys"),
];

const MIN_ASSUME_ROLE_DURATION: Duration = Duration::from_secs(15 * 60);
const MAX_ASSUME_ROLE_DURATION: Duration = Duration::from_secs(12 * 3600);

const ALIAS_NAME_PATTERN: &str = r"alias/[a-zA-Z0-9/_-]+";
const MULTI_REGION_KEY_ID_PATTERN: &str = r"mrk-[a-f0-9]{32}";
const UUID_PATTERN: &str =
    r"[a-f0-9]{8}-[a-f0-9]{4}-[1-5][a-f0-9]{3}-[ab89][a-f0-9]{3}-[a-f0-9]{12}";

static KMS_KEY_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        "^(?:{}|{}|{})$",
        ALIAS_NAME_PATTERN, MULTI_REGION_KEY_ID_PATTERN, UUID_PATTERN
    ))
    .expect("KMS key id pattern is valid")
});

static ACCOUNT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:aws|\d{12})$").expect("account id pattern is valid"));

static EXTERNAL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_+=,.@:/\-]*$").expect("external id pattern is valid"));

static SESSION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_+=,.@\-]*$").expect("session name pattern is valid"));

/// Check the configuration of an S3 backend.
///
/// Structural problems (types, required and unknown attributes) are reported
/// first; the semantic rules only run on a structurally valid configuration.
pub fn prepare_config(config: &BackendConfig, env: &dyn Environment) -> Diagnostics {
    let mut diags = config_schema().check(&config.attributes);
    if diags.has_errors() {
        return diags;
    }

    validate_bucket(config, &mut diags);
    validate_key(config, &mut diags);
    validate_region_is_set(config, env, &mut diags);
    validate_encryption_keys(config, env, &mut diags);
    validate_workspace_key_prefix(config, &mut diags);

    validate_attributes_conflict(
        config,
        &["shared_credentials_file", "shared_credentials_files"],
        &mut diags,
    );
    if config.is_set("shared_credentials_file") {
        diags.push(Diagnostic::attribute_warning(
            AttributePath::attr("shared_credentials_file"),
            "Deprecated Parameter",
            r#"Parameter "shared_credentials_file" is deprecated. Use "shared_credentials_files" instead."#,
        ));
    }

    validate_assume_role_migration(config, &mut diags);

    validate_attributes_conflict(
        config,
        &["allowed_account_ids", "forbidden_account_ids"],
        &mut diags,
    );

    diags
}

fn non_empty<'a>(config: &'a BackendConfig, name: &str) -> Option<&'a str> {
    config.get_string(name).filter(|s| !s.is_empty())
}

fn validate_bucket(config: &BackendConfig, diags: &mut Diagnostics) {
    if non_empty(config, "bucket").is_none() {
        diags.push(Diagnostic::attribute_error(
            AttributePath::attr("bucket"),
            "Invalid bucket value",
            r#"The "bucket" attribute value must not be empty."#,
        ));
    }
}

fn validate_key(config: &BackendConfig, diags: &mut Diagnostics) {
    match non_empty(config, "key") {
        None => diags.push(Diagnostic::attribute_error(
            AttributePath::attr("key"),
            "Invalid key value",
            r#"The "key" attribute value must not be empty."#,
        )),
        // S3 strips leading slashes, which would break the workspace layout,
        // and treats a trailing slash as a directory.
        Some(key) if key.starts_with('/') || key.ends_with('/') => {
            diags.push(Diagnostic::attribute_error(
                AttributePath::attr("key"),
                "Invalid key value",
                r#"The "key" attribute value must not start or end with "/"."#,
            ))
        }
        Some(_) => {}
    }
}

fn validate_region_is_set(config: &BackendConfig, env: &dyn Environment, diags: &mut Diagnostics) {
    if non_empty(config, "region").is_none()
        && env.first_var(&["AWS_REGION", "AWS_DEFAULT_REGION"]).is_none()
    {
        diags.push(Diagnostic::attribute_error(
            AttributePath::attr("region"),
            "Missing region value",
            r#"The "region" attribute or the "AWS_REGION" or "AWS_DEFAULT_REGION" environment variables must be set."#,
        ));
    }
}

fn validate_encryption_keys(config: &BackendConfig, env: &dyn Environment, diags: &mut Diagnostics) {
    let Some(kms_key_id) = non_empty(config, "kms_key_id") else {
        return;
    };

    if non_empty(config, "sse_customer_key").is_some() {
        diags.push(Diagnostic::attribute_error(
            AttributePath::root(),
            "Invalid encryption configuration",
            ENCRYPTION_KEY_CONFLICT,
        ));
    } else if env.var("AWS_SSE_CUSTOMER_KEY").is_some() {
        diags.push(Diagnostic::attribute_error(
            AttributePath::root(),
            "Invalid encryption configuration",
            ENCRYPTION_KEY_ENV_CONFLICT,
        ));
    }

    diags.extend(validate_kms_key(&AttributePath::attr("kms_key_id"), kms_key_id));
}

fn validate_workspace_key_prefix(config: &BackendConfig, diags: &mut Diagnostics) {
    if let Some(prefix) = config.get_string("workspace_key_prefix")
        && (prefix.starts_with('/') || prefix.ends_with('/'))
    {
        diags.push(Diagnostic::attribute_error(
            AttributePath::attr("workspace_key_prefix"),
            "Invalid workspace_key_prefix value",
            r#"The "workspace_key_prefix" attribute value must not start or end with "/"."#,
        ));
    }
}

/// Report an error when more than one of `names` is set
fn validate_attributes_conflict(config: &BackendConfig, names: &[&str], diags: &mut Diagnostics) {
    let set = names.iter().filter(|name| config.is_set(name)).count();
    if set > 1 {
        let quoted: Vec<String> = names.iter().map(|n| format!("{:?}", n)).collect();
        diags.push(Diagnostic::attribute_error(
            AttributePath::root(),
            "Invalid Attribute Combination",
            format!("Only one of {} can be set.", quoted.join(", ")),
        ));
    }
}

fn validate_assume_role_migration(config: &BackendConfig, diags: &mut Diagnostics) {
    let defined = find_deprecated_fields(config);

    if let Some(assume_role) = config.get_object("assume_role") {
        diags.extend(validate_nested_assume_role(
            assume_role,
            &AttributePath::attr("assume_role"),
        ));

        if !defined.is_empty() {
            diags.push(Diagnostic::attribute_error(
                AttributePath::root(),
                "Conflicting Parameters",
                format!(
                    "The following deprecated parameters conflict with the parameter \"assume_role\". Replace them as follows:\n{}",
                    format_deprecated(&defined)
                ),
            ));
        }
    } else if !defined.is_empty() {
        diags.push(Diagnostic::attribute_warning(
            AttributePath::root(),
            "Deprecated Parameters",
            format!(
                "The following parameters have been deprecated. Replace them as follows:\n{}",
                format_deprecated(&defined)
            ),
        ));
    }
}

/// Legacy assume-role attributes that are set, with their replacements
pub(crate) fn find_deprecated_fields(config: &BackendConfig) -> BTreeMap<&'static str, &'static str> {
    ASSUME_ROLE_DEPRECATED_FIELDS
        .iter()
        .filter(|(name, _)| config.is_set(name))
        .copied()
        .collect()
}

/// One `  * old -> new` line per field, sorted, with aligned arrows
pub(crate) fn format_deprecated(fields: &BTreeMap<&str, &str>) -> String {
    let width = fields.keys().map(|k| k.len()).max().unwrap_or(0);
    fields
        .iter()
        .map(|(deprecated, replacement)| {
            format!("  * {:<width$} -> {}\n", deprecated, replacement, width = width)
        })
        .collect()
}

/// Check a KMS key ARN or key id
pub(crate) fn validate_kms_key(path: &AttributePath, value: &str) -> Diagnostics {
    if is_arn(value) {
        validate_kms_key_arn(path, value)
    } else if KMS_KEY_ID.is_match(value) {
        Diagnostics::new()
    } else {
        Diagnostic::attribute_error(
            path.clone(),
            "Invalid KMS Key ID",
            format!("Value must be a valid KMS Key ID, got {:?}", value),
        )
        .into()
    }
}

fn validate_kms_key_arn(path: &AttributePath, value: &str) -> Diagnostics {
    let invalid = |detail: String| -> Diagnostics {
        Diagnostic::attribute_error(path.clone(), "Invalid KMS Key ARN", detail).into()
    };

    let arn = match Arn::parse(value) {
        Ok(arn) => arn,
        Err(e) => return invalid(format!("Value {:?} cannot be parsed as an ARN: {}", value, e)),
    };
    if arn.service != "kms" {
        return invalid(format!("Value must be a valid KMS Key ARN, got {:?}", value));
    }
    if arn.region.is_empty() || arn.account_id.is_empty() {
        return invalid(format!("Value must be a valid KMS Key ARN, got {:?}", value));
    }
    if !(arn.resource.starts_with("key/") || arn.resource.starts_with("alias/")) {
        return invalid(format!("Value must be a valid KMS Key ARN, got {:?}", value));
    }
    Diagnostics::new()
}

/// Check the attributes of the nested `assume_role` block
pub(crate) fn validate_nested_assume_role(
    block: &HashMap<String, Value>,
    path: &AttributePath,
) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let get_str = |name: &str| block.get(name).and_then(Value::as_str);

    if let Some(role_arn) = get_str("role_arn") {
        diags.extend(validate_arn(&path.child("role_arn"), role_arn));
    }

    if let Some(duration) = get_str("duration") {
        let attr_path = path.child("duration");
        match parse_duration(duration) {
            Err(e) => diags.push(Diagnostic::attribute_error(
                attr_path,
                "Invalid Duration",
                format!("The value {:?} cannot be parsed as a duration: {}", duration, e),
            )),
            Ok(d) if d < MIN_ASSUME_ROLE_DURATION || d > MAX_ASSUME_ROLE_DURATION => {
                diags.push(Diagnostic::attribute_error(
                    attr_path,
                    "Invalid Duration",
                    "Duration must be between 15m0s and 12h0m0s, inclusive",
                ))
            }
            Ok(_) => {}
        }
    }

    if let Some(external_id) = get_str("external_id") {
        validate_string_shape(
            &path.child("external_id"),
            "Invalid External ID",
            external_id,
            2..=1224,
            &EXTERNAL_ID,
            &mut diags,
        );
    }

    if let Some(policy) = get_str("policy") {
        match serde_json::from_str::<serde_json::Value>(policy.trim()) {
            Ok(serde_json::Value::Object(_)) => {}
            Ok(_) => diags.push(Diagnostic::attribute_error(
                path.child("policy"),
                "Invalid IAM Policy",
                "The policy must be a JSON object",
            )),
            Err(e) => diags.push(Diagnostic::attribute_error(
                path.child("policy"),
                "Invalid JSON",
                format!("The value cannot be parsed as JSON: {}", e),
            )),
        }
    }

    if let Some(policy_arns) = block.get("policy_arns").and_then(string_list) {
        for arn in &policy_arns {
            diags.extend(validate_arn(&path.child("policy_arns"), arn));
        }
    }

    if let Some(session_name) = get_str("session_name") {
        validate_string_shape(
            &path.child("session_name"),
            "Invalid Session Name",
            session_name,
            2..=64,
            &SESSION_NAME,
            &mut diags,
        );
    }

    if let Some(tags) = block.get("tags").and_then(string_map) {
        let mut keys: Vec<&String> = tags.keys().collect();
        keys.sort();
        for key in keys {
            if key.is_empty() || key.chars().count() > 128 {
                diags.push(Diagnostic::attribute_error(
                    path.child("tags"),
                    "Invalid Tag Key",
                    format!("Tag key {:?} must be between 1 and 128 characters", key),
                ));
            }
            if tags[key].chars().count() > 256 {
                diags.push(Diagnostic::attribute_error(
                    path.child("tags"),
                    "Invalid Tag Value",
                    format!("Value of tag {:?} must be at most 256 characters", key),
                ));
            }
        }
    }

    diags
}

fn validate_string_shape(
    path: &AttributePath,
    summary: &str,
    value: &str,
    length: std::ops::RangeInclusive<usize>,
    pattern: &Regex,
    diags: &mut Diagnostics,
) {
    let len = value.chars().count();
    if !length.contains(&len) {
        diags.push(Diagnostic::attribute_error(
            path.clone(),
            summary,
            format!(
                "Length must be between {} and {} characters, got {}",
                length.start(),
                length.end(),
                len
            ),
        ));
    } else if !pattern.is_match(value) {
        diags.push(Diagnostic::attribute_error(
            path.clone(),
            summary,
            format!("Value {:?} contains characters that are not allowed", value),
        ));
    }
}

fn validate_arn(path: &AttributePath, value: &str) -> Diagnostics {
    match Arn::parse(value) {
        Ok(arn) if !arn.account_id.is_empty() && !ACCOUNT_ID.is_match(arn.account_id) => {
            Diagnostic::attribute_error(
                path.clone(),
                "Invalid ARN",
                format!(
                    "The value {:?} cannot be parsed as an ARN: invalid account ID value (expecting to match regular expression: {})",
                    value,
                    ACCOUNT_ID.as_str()
                ),
            )
            .into()
        }
        Ok(_) => Diagnostics::new(),
        Err(e) => Diagnostic::attribute_error(
            path.clone(),
            "Invalid ARN",
            format!("The value {:?} cannot be parsed as an ARN: {}", value, e),
        )
        .into(),
    }
}

fn is_arn(value: &str) -> bool {
    value.starts_with("arn:") && value.split(':').count() >= 6
}

/// Components of an Amazon Resource Name
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Arn<'a> {
    pub partition: &'a str,
    pub service: &'a str,
    pub region: &'a str,
    pub account_id: &'a str,
    pub resource: &'a str,
}

impl<'a> Arn<'a> {
    /// Parse `arn:partition:service:region:account-id:resource`
    pub fn parse(value: &'a str) -> Result<Self, &'static str> {
        let rest = value.strip_prefix("arn:").ok_or("arn: invalid prefix")?;
        let mut parts = rest.splitn(5, ':');
        let (Some(partition), Some(service), Some(region), Some(account_id), Some(resource)) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err("arn: not enough sections");
        };
        Ok(Self {
            partition,
            service,
            region,
            account_id,
            resource,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLE: &str = "arn:aws:iam::123456789012:role/deploy";
    const KMS_ARN: &str =
        "arn:aws:kms:us-west-2:123456789012:key/1234abcd-12ab-34cd-56ef-1234567890ab";

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn base() -> BackendConfig {
        BackendConfig::new("s3")
            .with_attribute("bucket", "tf-state")
            .with_attribute("key", "network/terraform.tfstate")
            .with_attribute("region", "us-west-2")
    }

    fn strings(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| Value::from(*s)).collect())
    }

    fn object(pairs: &[(&str, Value)]) -> Value {
        Value::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn summaries(diags: &Diagnostics) -> Vec<&str> {
        diags.iter().map(|d| d.summary.as_str()).collect()
    }

    #[test]
    fn valid_config_has_no_diagnostics() {
        let diags = prepare_config(&base(), &env(&[]));
        assert!(diags.is_empty(), "{}", diags);
    }

    #[test]
    fn schema_errors_stop_validation() {
        let config = BackendConfig::new("s3")
            .with_attribute("key", "k")
            .with_attribute("encrypt", "yes");
        let diags = prepare_config(&config, &env(&[]));
        assert_eq!(
            summaries(&diags),
            vec!["Missing required argument", "Incorrect attribute value type"]
        );
    }

    #[test]
    fn empty_bucket_is_rejected() {
        let config = base().with_attribute("bucket", "");
        let diags = prepare_config(&config, &env(&[]));
        let diag = diags.find("Invalid bucket value").unwrap();
        assert_eq!(diag.path, Some(AttributePath::attr("bucket")));
    }

    #[test]
    fn key_with_surrounding_slash_is_rejected() {
        for key in ["/state.tfstate", "state/", ""] {
            let config = base().with_attribute("key", key);
            let diags = prepare_config(&config, &env(&[]));
            assert_eq!(summaries(&diags), vec!["Invalid key value"], "key {:?}", key);
        }
    }

    #[test]
    fn region_may_come_from_environment() {
        let mut config = base();
        config.attributes.remove("region");

        let diags = prepare_config(&config, &env(&[]));
        assert_eq!(summaries(&diags), vec!["Missing region value"]);

        let diags = prepare_config(&config, &env(&[("AWS_REGION", "eu-west-1")]));
        assert!(diags.is_empty());

        let diags = prepare_config(&config, &env(&[("AWS_DEFAULT_REGION", "eu-west-1")]));
        assert!(diags.is_empty());

        let diags = prepare_config(&config, &env(&[("AWS_REGION", "")]));
        assert_eq!(summaries(&diags), vec!["Missing region value"]);
    }

    #[test]
    fn kms_key_and_customer_key_conflict() {
        let config = base()
            .with_attribute("kms_key_id", KMS_ARN)
            .with_attribute("sse_customer_key", "4Dm1n4rQhD3Yqwnw8JqYIF8CKp0XN0Z2G1AJQVnR5qg=");
        let diags = prepare_config(&config, &env(&[]));
        let diag = diags.find("Invalid encryption configuration").unwrap();
        assert_eq!(diag.detail, ENCRYPTION_KEY_CONFLICT);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn kms_key_conflicts_with_customer_key_env() {
        let config = base().with_attribute("kms_key_id", KMS_ARN);
        let diags = prepare_config(
            &config,
            &env(&[("AWS_SSE_CUSTOMER_KEY", "4Dm1n4rQhD3Yqwnw8JqYIF8CKp0XN0Z2G1AJQVnR5qg=")]),
        );
        let diag = diags.find("Invalid encryption configuration").unwrap();
        assert_eq!(diag.detail, ENCRYPTION_KEY_ENV_CONFLICT);
    }

    #[test]
    fn kms_key_formats() {
        let path = AttributePath::attr("kms_key_id");
        for valid in [
            KMS_ARN,
            "arn:aws:kms:us-west-2:123456789012:alias/state",
            "1234abcd-12ab-34cd-86ef-1234567890ab",
            "mrk-1234abcd12ab34cd56ef1234567890ab",
            "alias/state-key",
        ] {
            assert!(validate_kms_key(&path, valid).is_empty(), "{}", valid);
        }

        let diags = validate_kms_key(&path, "not-a-key");
        assert_eq!(summaries(&diags), vec!["Invalid KMS Key ID"]);

        let diags = validate_kms_key(&path, "arn:aws:s3:us-west-2:123456789012:key/abc");
        assert_eq!(summaries(&diags), vec!["Invalid KMS Key ARN"]);

        let diags = validate_kms_key(&path, "arn:aws:kms:us-west-2:123456789012:grant/abc");
        assert_eq!(summaries(&diags), vec!["Invalid KMS Key ARN"]);
    }

    #[test]
    fn workspace_key_prefix_slashes() {
        for prefix in ["/env", "env/"] {
            let config = base().with_attribute("workspace_key_prefix", prefix);
            let diags = prepare_config(&config, &env(&[]));
            assert_eq!(summaries(&diags), vec!["Invalid workspace_key_prefix value"]);
        }
        let config = base().with_attribute("workspace_key_prefix", "workspaces/team");
        assert!(prepare_config(&config, &env(&[])).is_empty());
    }

    #[test]
    fn shared_credentials_file_is_deprecated() {
        let config = base().with_attribute("shared_credentials_file", "~/.aws/creds");
        let diags = prepare_config(&config, &env(&[]));
        assert!(!diags.has_errors());
        let diag = diags.find("Deprecated Parameter").unwrap();
        assert_eq!(diag.path, Some(AttributePath::attr("shared_credentials_file")));
    }

    #[test]
    fn shared_credentials_file_conflicts_with_list() {
        let mut config = base().with_attribute("shared_credentials_file", "~/.aws/creds");
        config
            .attributes
            .insert("shared_credentials_files".to_string(), strings(&["~/.aws/other"]));
        let diags = prepare_config(&config, &env(&[]));
        let diag = diags.find("Invalid Attribute Combination").unwrap();
        assert_eq!(
            diag.detail,
            r#"Only one of "shared_credentials_file", "shared_credentials_files" can be set."#
        );
        assert!(diags.find("Deprecated Parameter").is_some());
    }

    #[test]
    fn account_id_lists_are_exclusive() {
        let mut config = base();
        config
            .attributes
            .insert("allowed_account_ids".to_string(), strings(&["111111111111"]));
        assert!(prepare_config(&config, &env(&[])).is_empty());

        config
            .attributes
            .insert("forbidden_account_ids".to_string(), strings(&["222222222222"]));
        let diags = prepare_config(&config, &env(&[]));
        assert_eq!(summaries(&diags), vec!["Invalid Attribute Combination"]);
    }

    #[test]
    fn repeated_set_elements_are_accepted() {
        let mut config = base();
        config.attributes.insert(
            "allowed_account_ids".to_string(),
            strings(&["111111111111", "111111111111"]),
        );
        config.attributes.insert(
            "shared_config_files".to_string(),
            strings(&["/etc/aws/config", "/etc/aws/config"]),
        );
        assert!(prepare_config(&config, &env(&[])).is_empty());
    }

    #[test]
    fn legacy_assume_role_fields_warn() {
        let config = base()
            .with_attribute("role_arn", ROLE)
            .with_attribute("session_name", "ci");
        let diags = prepare_config(&config, &env(&[]));
        assert!(!diags.has_errors());
        let diag = diags.find("Deprecated Parameters").unwrap();
        assert_eq!(
            diag.detail,
            "The following parameters have been deprecated. Replace them as follows:\n  * role_arn     -> assume_role.role_arn\n  * session_name -> assume_role.session_name\n"
        );
    }

    #[test]
    fn legacy_fields_conflict_with_nested_block() {
        let mut config = base().with_attribute("external_id", "abc123");
        config.attributes.insert(
            "assume_role".to_string(),
            object(&[("role_arn", Value::from(ROLE))]),
        );
        let diags = prepare_config(&config, &env(&[]));
        let diag = diags.find("Conflicting Parameters").unwrap();
        assert!(diag.is_error());
        assert!(diag.detail.ends_with("  * external_id -> assume_role.external_id\n"));
        assert!(diags.find("Deprecated Parameters").is_none());
    }

    #[test]
    fn nested_assume_role_is_validated() {
        let block = object(&[
            ("role_arn", Value::from("not-an-arn")),
            ("duration", Value::from("5m")),
            ("external_id", Value::from("x")),
            ("policy", Value::from("{not json")),
            ("session_name", Value::from("has space")),
            ("policy_arns", strings(&["arn:aws:iam::123456789012:policy/ro"])),
        ]);
        let Value::Map(block) = block else {
            unreachable!()
        };
        let diags = validate_nested_assume_role(&block, &AttributePath::attr("assume_role"));
        assert_eq!(
            summaries(&diags),
            vec![
                "Invalid ARN",
                "Invalid Duration",
                "Invalid External ID",
                "Invalid JSON",
                "Invalid Session Name"
            ]
        );
        assert_eq!(
            diags.iter().next().unwrap().path.as_ref().unwrap().to_string(),
            "assume_role.role_arn"
        );
    }

    #[test]
    fn nested_assume_role_accepts_valid_values() {
        let block = object(&[
            ("role_arn", Value::from(ROLE)),
            ("duration", Value::from("1h")),
            ("external_id", Value::from("ext-id:42")),
            ("policy", Value::from(r#"{"Version": "2012-10-17", "Statement": []}"#)),
            ("session_name", Value::from("ci@pipeline")),
            ("tags", object(&[("team", Value::from("platform"))])),
        ]);
        let Value::Map(block) = block else {
            unreachable!()
        };
        let diags = validate_nested_assume_role(&block, &AttributePath::attr("assume_role"));
        assert!(diags.is_empty(), "{}", diags);
    }

    #[test]
    fn duration_bounds_are_inclusive() {
        for (duration, ok) in [("15m", true), ("12h", true), ("14m59s", false), ("12h1s", false)] {
            let block: HashMap<String, Value> = [
                ("role_arn".to_string(), Value::from(ROLE)),
                ("duration".to_string(), Value::from(duration)),
            ]
            .into_iter()
            .collect();
            let diags = validate_nested_assume_role(&block, &AttributePath::attr("assume_role"));
            assert_eq!(diags.is_empty(), ok, "duration {}", duration);
        }
    }

    #[test]
    fn arn_parsing() {
        let arn = Arn::parse(ROLE).unwrap();
        assert_eq!(arn.partition, "aws");
        assert_eq!(arn.service, "iam");
        assert_eq!(arn.region, "");
        assert_eq!(arn.account_id, "123456789012");
        assert_eq!(arn.resource, "role/deploy");

        assert!(Arn::parse("arn:aws:iam").is_err());
        assert!(Arn::parse("role/deploy").is_err());
    }

    #[test]
    fn arn_sections_may_be_empty() {
        let arn = Arn::parse("arn::iam::123456789012:").unwrap();
        assert_eq!(arn.partition, "");
        assert_eq!(arn.resource, "");
        assert!(Arn::parse("arn:::::").is_ok());

        let path = AttributePath::attr("assume_role").child("role_arn");
        assert!(validate_arn(&path, "arn::iam::123456789012:role/x").is_empty());
        assert!(validate_arn(&path, "arn:aws:iam::12345:role/x").has_errors());
    }

    #[test]
    fn names_are_limited_to_ascii_word_characters() {
        for (name, value, summary) in [
            ("session_name", "dépôt", "Invalid Session Name"),
            ("external_id", "clé:42", "Invalid External ID"),
            ("session_name", "build٣", "Invalid Session Name"),
        ] {
            let block: HashMap<String, Value> = [
                ("role_arn".to_string(), Value::from(ROLE)),
                (name.to_string(), Value::from(value)),
            ]
            .into_iter()
            .collect();
            let diags = validate_nested_assume_role(&block, &AttributePath::attr("assume_role"));
            assert_eq!(summaries(&diags), vec![summary], "{} = {}", name, value);
        }
    }
}
