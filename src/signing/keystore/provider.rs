use super::{KeyStore, SigningComponents};
use crate::signing::builder::v1_signer_name;
use crate::signing::error::KeyError;

/// Resolves exactly one private key and its chain from `store`.
///
/// With no alias (or an empty one) the store must hold exactly one private
/// key entry. A named alias must exist and hold a private key.
pub fn resolve_signing_components(
    store: &dyn KeyStore,
    alias: Option<&str>,
) -> Result<SigningComponents, KeyError> {
    let alias = match alias.filter(|a| !a.is_empty()) {
        Some(alias) => alias.to_string(),
        None => only_private_key_alias(store)?,
    };

    let entry = store
        .private_key_entry(&alias)?
        .ok_or_else(|| KeyError::GeneralSecurity {
            alias: alias.clone(),
            reason: "no private key entry with this alias".to_string(),
        })?;

    if entry.chain.is_empty() {
        return Err(KeyError::GeneralSecurity {
            alias,
            reason: "private key entry has no certificate chain".to_string(),
        });
    }

    log::debug!(
        "using key alias {alias} with a chain of {} certificate(s)",
        entry.chain.len()
    );

    Ok(SigningComponents {
        v1_signer_name: v1_signer_name(&alias),
        alias,
        private_key: entry.key,
        certificate_chain: entry.chain,
    })
}

fn only_private_key_alias(store: &dyn KeyStore) -> Result<String, KeyError> {
    let mut aliases = store.private_key_aliases();
    match aliases.len() {
        1 => Ok(aliases.remove(0)),
        0 => Err(KeyError::UnrecoverableKey {
            reason: "key store contains no private key entries".to_string(),
        }),
        n => Err(KeyError::UnrecoverableKey {
            reason: format!(
                "key store contains {n} private key entries ({}); specify a key alias",
                aliases.join(", ")
            ),
        }),
    }
}
