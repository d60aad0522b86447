//! AWS client construction for the S3 backend

use aws_config::ecs::EcsCredentialsProvider;
use aws_config::environment::EnvironmentVariableCredentialsProvider;
use aws_config::meta::credentials::CredentialsProviderChain;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use aws_config::provider_config::ProviderConfig;
use aws_config::retry::RetryConfig;
use aws_config::sts::AssumeRoleProvider;
use aws_config::web_identity_token::WebIdentityTokenCredentialsProvider;
use aws_config::{AppName, BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use strata_core::diagnostics::{AttributePath, Diagnostic, Diagnostics};

use super::config::{AssumeRole, MetadataService, S3BackendConfig};
use crate::env::Environment;

const APP_NAME: &str = "strata";
const CREDENTIALS_PROVIDER_NAME: &str = "S3BackendConfig";

/// Clients used by a configured S3 backend
#[derive(Debug, Clone)]
pub struct S3Clients {
    pub sdk_config: SdkConfig,
    pub s3: aws_sdk_s3::Client,
    pub dynamodb: aws_sdk_dynamodb::Client,
}

/// Build the S3 and DynamoDB clients for a configuration.
///
/// Credential resolution and retries are left to the SDK; this maps the
/// configuration onto SDK options. Unless `skip_credentials_validation` is
/// set, the credentials are then resolved, the caller is identified through
/// STS and its account is checked against the allowed and forbidden lists.
pub async fn build_clients(
    config: &S3BackendConfig,
    env: &dyn Environment,
) -> (Option<S3Clients>, Diagnostics) {
    let mut diags = Diagnostics::new();

    if config.endpoints.iam.is_some() {
        diags.push(Diagnostic::attribute_warning(
            AttributePath::attr("iam_endpoint"),
            "Unused Parameter",
            "The IAM endpoint is not used when resolving credentials; account details are retrieved through STS.",
        ));
    }

    let mut sdk_config = load_sdk_config(config, env).await;

    if let Some(role) = &config.assume_role {
        if !role.transitive_tag_keys.is_empty() {
            diags.push(Diagnostic::warning(
                "Unsupported transitive tag keys",
                "Transitive tag keys are not passed to the STS AssumeRole call and will be ignored.",
            ));
        }
        let provider = assume_role_provider(role, &sdk_config, config).await;
        sdk_config = sdk_config
            .into_builder()
            .credentials_provider(SharedCredentialsProvider::new(provider))
            .build();
    }

    if config.skip_credentials_validation {
        if !config.allowed_account_ids.is_empty() || !config.forbidden_account_ids.is_empty() {
            log::warn!("skipping account ID verification: credentials validation is disabled");
        }
    } else {
        diags.extend(validate_credentials(&sdk_config, config).await);
    }
    if diags.has_errors() {
        return (None, diags);
    }

    let s3 = aws_sdk_s3::Client::from_conf(s3_client_config(&sdk_config, config));
    let dynamodb = aws_sdk_dynamodb::Client::from_conf(dynamodb_client_config(&sdk_config, config));

    log::debug!(
        "configured S3 backend clients for bucket {} (region: {:?})",
        config.bucket,
        config.region
    );

    (
        Some(S3Clients {
            sdk_config,
            s3,
            dynamodb,
        }),
        diags,
    )
}

/// Load the shared SDK configuration (region, retries, credentials)
pub async fn load_sdk_config(config: &S3BackendConfig, env: &dyn Environment) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).retry_config(retry_config(config));

    if let Ok(app_name) = AppName::new(APP_NAME) {
        loader = loader.app_name(app_name);
    }
    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(profile) = &config.profile {
        loader = loader.profile_name(profile);
    }
    let profile_files = profile_files(config);
    if let Some(files) = &profile_files {
        loader = loader.profile_files(files.clone());
    }

    if let Some(credentials) = static_credentials(config, env) {
        log::debug!("using static credentials from the backend configuration");
        loader = loader.credentials_provider(credentials);
    } else if config.metadata_service == MetadataService::Disabled {
        log::debug!("EC2 metadata service disabled for credential resolution");
        loader = loader.credentials_provider(credentials_chain_without_imds(config, profile_files));
    }

    loader.load().await
}

/// The SDK's default credential chain without its EC2 instance metadata
/// provider: environment, profile (including SSO and credential_process),
/// web identity token, then ECS container credentials
fn credentials_chain_without_imds(
    config: &S3BackendConfig,
    profile_files: Option<ProfileFiles>,
) -> CredentialsProviderChain {
    let provider_config =
        ProviderConfig::default().with_region(config.region.clone().map(Region::new));

    let mut profile = ProfileFileCredentialsProvider::builder().configure(&provider_config);
    if let Some(name) = &config.profile {
        profile = profile.profile_name(name);
    }
    if let Some(files) = profile_files {
        profile = profile.profile_files(files);
    }

    CredentialsProviderChain::first_try(
        "Environment",
        EnvironmentVariableCredentialsProvider::new(),
    )
    .or_else("Profile", profile.build())
    .or_else(
        "WebIdentityToken",
        WebIdentityTokenCredentialsProvider::builder()
            .configure(&provider_config)
            .build(),
    )
    .or_else(
        "EcsContainer",
        EcsCredentialsProvider::builder()
            .configure(&provider_config)
            .build(),
    )
}

/// Retry configuration: the first attempt plus `max_retries` retries
pub fn retry_config(config: &S3BackendConfig) -> RetryConfig {
    RetryConfig::standard().with_max_attempts(config.max_retries.saturating_add(1))
}

/// Custom shared credentials/config files, if any are configured
fn profile_files(config: &S3BackendConfig) -> Option<ProfileFiles> {
    if config.shared_credentials_files.is_empty() && config.shared_config_files.is_empty() {
        return None;
    }
    let mut files = ProfileFiles::builder();
    if config.shared_config_files.is_empty() {
        files = files.include_default_config_file(true);
    }
    if config.shared_credentials_files.is_empty() {
        files = files.include_default_credentials_file(true);
    }
    for path in &config.shared_config_files {
        files = files.with_file(ProfileFileKind::Config, path);
    }
    for path in &config.shared_credentials_files {
        files = files.with_file(ProfileFileKind::Credentials, path);
    }
    Some(files.build())
}

/// Static credentials from the configuration.
///
/// With the legacy workflow, credentials in `AWS_ACCESS_KEY_ID` take
/// precedence over the configured ones, so none are returned here and the
/// SDK's environment provider picks them up.
pub fn static_credentials(config: &S3BackendConfig, env: &dyn Environment) -> Option<Credentials> {
    let access_key = config.access_key.as_ref()?;
    let secret_key = config.secret_key.as_ref()?;

    if config.use_legacy_workflow && env.var("AWS_ACCESS_KEY_ID").is_some() {
        log::debug!("legacy workflow: environment credentials take precedence");
        return None;
    }

    Some(Credentials::new(
        access_key.clone(),
        secret_key.expose().clone(),
        config.token.as_ref().map(|t| t.expose().clone()),
        None,
        CREDENTIALS_PROVIDER_NAME,
    ))
}

async fn assume_role_provider(
    role: &AssumeRole,
    base: &SdkConfig,
    config: &S3BackendConfig,
) -> AssumeRoleProvider {
    log::debug!("assuming role {}", role.role_arn);

    let sts_config = match &config.endpoints.sts {
        Some(endpoint) => base.clone().into_builder().endpoint_url(endpoint).build(),
        None => base.clone(),
    };

    let mut builder = AssumeRoleProvider::builder(&role.role_arn).configure(&sts_config);
    if let Some(name) = &role.session_name {
        builder = builder.session_name(name);
    }
    if let Some(external_id) = &role.external_id {
        builder = builder.external_id(external_id);
    }
    if let Some(policy) = &role.policy {
        builder = builder.policy(policy);
    }
    if !role.policy_arns.is_empty() {
        builder = builder.policy_arns(role.policy_arns.clone());
    }
    if let Some(duration) = role.duration {
        builder = builder.session_length(duration);
    }
    if !role.tags.is_empty() {
        builder = builder.tags(role.tags.clone());
    }
    if let Some(region) = &config.region {
        builder = builder.region(Region::new(region.clone()));
    }
    builder.build().await
}

/// S3 client options: custom endpoint and path-style addressing
pub fn s3_client_config(sdk_config: &SdkConfig, config: &S3BackendConfig) -> aws_sdk_s3::Config {
    let mut builder = aws_sdk_s3::config::Builder::from(sdk_config);
    if let Some(endpoint) = &config.endpoints.s3 {
        builder = builder.endpoint_url(endpoint);
    }
    if let Some(force_path_style) = config.force_path_style {
        builder = builder.force_path_style(force_path_style);
    }
    builder.build()
}

/// DynamoDB client options: custom endpoint
pub fn dynamodb_client_config(
    sdk_config: &SdkConfig,
    config: &S3BackendConfig,
) -> aws_sdk_dynamodb::Config {
    let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);
    if let Some(endpoint) = &config.endpoints.dynamodb {
        builder = builder.endpoint_url(endpoint);
    }
    builder.build()
}

/// Resolve credentials, identify the caller and check its account
async fn validate_credentials(sdk_config: &SdkConfig, config: &S3BackendConfig) -> Diagnostics {
    if let Err(detail) = resolve_credentials(sdk_config).await {
        return Diagnostic::error("No valid credential sources found", detail).into();
    }

    let mut builder = aws_sdk_sts::config::Builder::from(sdk_config);
    if let Some(endpoint) = &config.endpoints.sts {
        builder = builder.endpoint_url(endpoint);
    }
    let sts = aws_sdk_sts::Client::from_conf(builder.build());

    let account_id = match sts.get_caller_identity().send().await {
        Ok(output) => output.account().unwrap_or_default().to_string(),
        Err(e) => {
            return Diagnostic::error(
                "Retrieving AWS account details: failed to get caller identity",
                e.to_string(),
            )
            .into();
        }
    };
    log::debug!("credentials belong to AWS account {}", account_id);

    match verify_account_id(
        &account_id,
        &config.allowed_account_ids,
        &config.forbidden_account_ids,
    ) {
        Ok(()) => Diagnostics::new(),
        Err(e) => Diagnostic::error("Invalid account ID", e).into(),
    }
}

async fn resolve_credentials(sdk_config: &SdkConfig) -> Result<Credentials, String> {
    let provider = sdk_config
        .credentials_provider()
        .ok_or_else(|| "No credentials provider is configured.".to_string())?;
    provider
        .provide_credentials()
        .await
        .map_err(|e| e.to_string())
}

/// Check an account ID against the allowed and forbidden lists
pub fn verify_account_id(
    account_id: &str,
    allowed: &[String],
    forbidden: &[String],
) -> Result<(), String> {
    if forbidden.iter().any(|id| id == account_id) {
        return Err(format!("AWS account ID not allowed: {}", account_id));
    }
    if !allowed.is_empty() && !allowed.iter().any(|id| id == account_id) {
        return Err(format!("AWS account ID not allowed: {}", account_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendConfig;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn typed(config: BackendConfig) -> S3BackendConfig {
        S3BackendConfig::from_attributes(&config, &env(&[])).0
    }

    fn base() -> BackendConfig {
        BackendConfig::new("s3")
            .with_attribute("bucket", "tf-state")
            .with_attribute("key", "terraform.tfstate")
            .with_attribute("region", "us-west-2")
    }

    fn strings(items: &[&str]) -> strata_core::resource::Value {
        strata_core::resource::Value::List(items.iter().map(|s| (*s).into()).collect())
    }

    fn sdk_config() -> SdkConfig {
        SdkConfig::builder()
            .region(Region::new("us-west-2"))
            .behavior_version(BehaviorVersion::latest())
            .build()
    }

    #[test]
    fn test_verify_account_id() {
        let allowed = vec!["111111111111".to_string()];
        let forbidden = vec!["222222222222".to_string()];

        assert!(verify_account_id("111111111111", &allowed, &[]).is_ok());
        assert!(verify_account_id("333333333333", &[], &forbidden).is_ok());
        assert!(verify_account_id("333333333333", &[], &[]).is_ok());
        assert_eq!(
            verify_account_id("222222222222", &[], &forbidden).unwrap_err(),
            "AWS account ID not allowed: 222222222222"
        );
        assert!(verify_account_id("333333333333", &allowed, &[]).is_err());
    }

    #[test]
    fn test_retry_config_counts_first_attempt() {
        let config = typed(base());
        assert_eq!(retry_config(&config).max_attempts(), 6);

        let config = typed(base().with_attribute("max_retries", 0_i64));
        assert_eq!(retry_config(&config).max_attempts(), 1);
    }

    #[test]
    fn test_static_credentials() {
        let config = typed(
            base()
                .with_attribute("access_key", "AKIAEXAMPLE")
                .with_attribute("secret_key", "secret")
                .with_attribute("token", "session"),
        );

        let credentials = static_credentials(&config, &env(&[])).unwrap();
        assert_eq!(credentials.access_key_id(), "AKIAEXAMPLE");
        assert_eq!(credentials.secret_access_key(), "secret");
        assert_eq!(credentials.session_token(), Some("session"));

        // Legacy workflow prefers environment credentials
        let from_env = env(&[("AWS_ACCESS_KEY_ID", "AKIAENV")]);
        assert!(static_credentials(&config, &from_env).is_none());

        let mut modern = config.clone();
        modern.use_legacy_workflow = false;
        assert!(static_credentials(&modern, &from_env).is_some());
    }

    #[test]
    fn test_static_credentials_need_both_keys() {
        let config = typed(base().with_attribute("access_key", "AKIAEXAMPLE"));
        assert!(static_credentials(&config, &env(&[])).is_none());
    }

    #[test]
    fn test_profile_files() {
        assert!(profile_files(&typed(base())).is_none());
        let config = typed(base().with_attribute("shared_credentials_file", "/tmp/creds"));
        assert!(profile_files(&config).is_some());
    }

    #[test]
    fn test_client_configs_keep_region() {
        let config = typed(
            base()
                .with_attribute("endpoint", "http://localhost:9000")
                .with_attribute("dynamodb_endpoint", "http://localhost:8000")
                .with_attribute("force_path_style", true),
        );
        let sdk = sdk_config();

        let s3 = s3_client_config(&sdk, &config);
        assert_eq!(s3.region().map(|r| r.as_ref()), Some("us-west-2"));

        let dynamodb = dynamodb_client_config(&sdk, &config);
        assert_eq!(dynamodb.region().map(|r| r.as_ref()), Some("us-west-2"));
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_validation() {
        let config = typed(base());
        let diags = validate_credentials(&sdk_config(), &config).await;
        assert!(diags.has_errors());
        assert!(diags.find("No valid credential sources found").is_some());
    }

    #[tokio::test]
    async fn test_resolve_static_credentials() {
        let sdk = sdk_config()
            .into_builder()
            .credentials_provider(SharedCredentialsProvider::new(Credentials::new(
                "AKIAEXAMPLE",
                "secret",
                None,
                None,
                "test",
            )))
            .build();
        let credentials = resolve_credentials(&sdk).await.unwrap();
        assert_eq!(credentials.access_key_id(), "AKIAEXAMPLE");
    }

    #[tokio::test]
    async fn test_skipped_validation_builds_clients_offline() {
        let config = typed(
            base()
                .with_attribute("access_key", "AKIAEXAMPLE")
                .with_attribute("secret_key", "secret")
                .with_attribute("skip_credentials_validation", true)
                .with_attribute("allowed_account_ids", strings(&["111111111111"])),
        );

        let (clients, diags) = build_clients(&config, &env(&[])).await;
        assert!(!diags.has_errors());
        assert!(clients.is_some());
    }

    #[tokio::test]
    async fn test_disabled_metadata_service_keeps_other_providers() {
        let config = typed(base().with_attribute("skip_metadata_api_check", true));
        let chain = format!("{:?}", credentials_chain_without_imds(&config, None));

        for provider in ["Environment", "Profile", "WebIdentityToken", "EcsContainer"] {
            assert!(chain.contains(provider), "{} missing from {}", provider, chain);
        }
        assert!(!chain.contains("Ec2InstanceMetadata"));
    }

    #[tokio::test]
    async fn test_transitive_tag_keys_warn() {
        let config = typed(
            base()
                .with_attribute("access_key", "AKIAEXAMPLE")
                .with_attribute("secret_key", "secret")
                .with_attribute("skip_credentials_validation", true)
                .with_attribute("role_arn", "arn:aws:iam::123456789012:role/deploy")
                .with_attribute("assume_role_transitive_tag_keys", strings(&["team"])),
        );

        let (_, diags) = build_clients(&config, &env(&[])).await;
        assert!(diags.find("Unsupported transitive tag keys").is_some());
    }
}
