//! Configuration schema of the S3 backend

use strata_core::schema::{AttributeSchema, AttributeType, BlockSchema, types};

fn string(name: &str, description: &str) -> AttributeSchema {
    AttributeSchema::new(name, AttributeType::String).with_description(description)
}

fn boolean(name: &str, description: &str) -> AttributeSchema {
    AttributeSchema::new(name, AttributeType::Bool).with_description(description)
}

fn string_set(name: &str, description: &str) -> AttributeSchema {
    AttributeSchema::new(name, types::string_set()).with_description(description)
}

fn string_map(name: &str, description: &str) -> AttributeSchema {
    AttributeSchema::new(name, types::string_map()).with_description(description)
}

/// Attributes of the nested `assume_role` block
pub fn assume_role_schema() -> BlockSchema {
    BlockSchema::new()
        .attribute(string("role_arn", "The role to be assumed.").required())
        .attribute(string(
            "duration",
            "Seconds to restrict the assume role session duration.",
        ))
        .attribute(string(
            "external_id",
            "The external ID to use when assuming the role",
        ))
        .attribute(string(
            "policy",
            "IAM Policy JSON describing further restricting permissions for the IAM Role being assumed.",
        ))
        .attribute(string_set(
            "policy_arns",
            "Amazon Resource Names (ARNs) of IAM Policies describing further restricting permissions for the IAM Role being assumed.",
        ))
        .attribute(string(
            "session_name",
            "The session name to use when assuming the role.",
        ))
        .attribute(string_map("tags", "Assume role session tags."))
        .attribute(string_set(
            "transitive_tag_keys",
            "Assume role session tag keys to pass to any subsequent sessions.",
        ))
}

/// Attributes accepted by the S3 backend
pub fn config_schema() -> BlockSchema {
    BlockSchema::new()
        .with_description("Stores state as an object in an S3 bucket, optionally locked through DynamoDB")
        .attribute(string("bucket", "The name of the S3 bucket").required())
        .attribute(string("key", "The path to the state file inside the bucket").required())
        .attribute(string(
            "region",
            "AWS region of the S3 Bucket and DynamoDB Table (if used).",
        ))
        .attribute(string("dynamodb_endpoint", "A custom endpoint for the DynamoDB API"))
        .attribute(string("endpoint", "A custom endpoint for the S3 API"))
        .attribute(string("iam_endpoint", "A custom endpoint for the IAM API"))
        .attribute(string("sts_endpoint", "A custom endpoint for the STS API"))
        .attribute(boolean(
            "encrypt",
            "Whether to enable server side encryption of the state file",
        ))
        .attribute(string("acl", "Canned ACL to be applied to the state file"))
        .attribute(string("access_key", "AWS access key"))
        .attribute(string("secret_key", "AWS secret key").sensitive())
        .attribute(string(
            "kms_key_id",
            "The ARN of a KMS Key to use for encrypting the state",
        ))
        .attribute(string(
            "dynamodb_table",
            "DynamoDB table for state locking and consistency",
        ))
        .attribute(string("profile", "AWS profile name"))
        .attribute(string("shared_credentials_file", "Path to a shared credentials file").deprecated())
        .attribute(string_set(
            "shared_credentials_files",
            "Paths to a shared credentials files",
        ))
        .attribute(string_set("shared_config_files", "Paths to shared config files"))
        .attribute(string("token", "MFA token").sensitive())
        .attribute(boolean(
            "skip_credentials_validation",
            "Skip the credentials validation via STS API.",
        ))
        .attribute(boolean(
            "skip_metadata_api_check",
            "Skip the AWS Metadata API check.",
        ))
        .attribute(boolean(
            "skip_region_validation",
            "Skip static validation of region name.",
        ))
        .attribute(
            string(
                "sse_customer_key",
                "The base64-encoded encryption key to use for server-side encryption with customer-provided keys (SSE-C).",
            )
            .sensitive(),
        )
        .attribute(string("role_arn", "The role to be assumed").deprecated())
        .attribute(string("session_name", "The session name to use when assuming the role.").deprecated())
        .attribute(string("external_id", "The external ID to use when assuming the role").deprecated())
        .attribute(
            AttributeSchema::new("assume_role_duration_seconds", types::positive_int())
                .with_description("Seconds to restrict the assume role session duration.")
                .deprecated(),
        )
        .attribute(
            string(
                "assume_role_policy",
                "IAM Policy JSON describing further restricting permissions for the IAM Role being assumed.",
            )
            .deprecated(),
        )
        .attribute(
            string_set(
                "assume_role_policy_arns",
                "Amazon Resource Names (ARNs) of IAM Policies describing further restricting permissions for the IAM Role being assumed.",
            )
            .deprecated(),
        )
        .attribute(string_map("assume_role_tags", "Assume role session tags.").deprecated())
        .attribute(
            string_set(
                "assume_role_transitive_tag_keys",
                "Assume role session tag keys to pass to any subsequent sessions.",
            )
            .deprecated(),
        )
        .attribute(string(
            "workspace_key_prefix",
            "The prefix applied to the non-default state path inside the bucket.",
        ))
        .attribute(boolean("force_path_style", "Force s3 to use path style api."))
        .attribute(
            AttributeSchema::new("max_retries", types::non_negative_int()).with_description(
                "The maximum number of times an AWS API request is retried on retryable failure.",
            ),
        )
        .attribute(boolean(
            "use_legacy_workflow",
            "Use the legacy authentication workflow, preferring environment variables over backend configuration.",
        ))
        .attribute(AttributeSchema::new(
            "assume_role",
            AttributeType::Object(Box::new(assume_role_schema())),
        ))
        .attribute(string_set(
            "forbidden_account_ids",
            "List of forbidden AWS account IDs.",
        ))
        .attribute(string_set(
            "allowed_account_ids",
            "List of allowed AWS account IDs.",
        ))
}
