//! Region/account placeholders in destination fields

use crate::core::traits::CloudOperations;
use lazy_static::lazy_static;
use regex::Regex;

/// Replaced with the current region
pub const CURRENT_REGION_PLACEHOLDER: &str = "${AWS::Region}";

/// Replaced with the current account
pub const CURRENT_ACCOUNT_PLACEHOLDER: &str = "${AWS::AccountId}";

lazy_static! {
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"\$\{AWS::(Region|AccountId)\}").unwrap();
}

/// Substitute placeholders in a batch of strings.
///
/// Region and account are resolved at most once each, and only if some
/// string actually contains the corresponding placeholder.
pub async fn replace_placeholders(
    aws: &dyn CloudOperations,
    values: &mut [&mut String],
) -> anyhow::Result<()> {
    let needs_region = values.iter().any(|v| v.contains(CURRENT_REGION_PLACEHOLDER));
    let needs_account = values.iter().any(|v| v.contains(CURRENT_ACCOUNT_PLACEHOLDER));
    if !needs_region && !needs_account {
        return Ok(());
    }

    let region = if needs_region {
        Some(aws.default_region().await?)
    } else {
        None
    };
    let account = if needs_account {
        Some(aws.current_account().await?)
    } else {
        None
    };

    for value in values.iter_mut() {
        let replaced = PLACEHOLDER_RE
            .replace_all(value.as_str(), |caps: &regex::Captures| match &caps[1] {
                "Region" => region.clone().unwrap_or_default(),
                _ => account.clone().unwrap_or_default(),
            })
            .into_owned();
        **value = replaced;
    }

    Ok(())
}
