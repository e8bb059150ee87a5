use anyhow::Result;
use livekit_api::access_token::{AccessToken, VideoGrants};
use std::env;

fn resolve_credentials(
    api_key: Option<String>,
    api_secret: Option<String>,
) -> Result<(String, String)> {
    let nonempty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

    match (nonempty(api_key), nonempty(api_secret)) {
        (Some(key), Some(secret)) => Ok((key, secret)),
        _ => anyhow::bail!(
            "LIVEKIT_API_KEY and LIVEKIT_API_SECRET must be set (via environment or .env)"
        ),
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let (api_key, api_secret) = resolve_credentials(
        env::var("LIVEKIT_API_KEY").ok(),
        env::var("LIVEKIT_API_SECRET").ok(),
    )?;

    // Full-grant token for manual testing against room "1".
    let token = AccessToken::with_api_key(&api_key, &api_secret)
        .with_identity("google-userdaisuke")
        .with_name("Google User")
        .with_grants(VideoGrants {
            room_join: true,
            room: "1".to_string(),
            can_publish: true,
            can_subscribe: true,
            can_publish_data: true,
            ..Default::default()
        })
        .to_jwt()?;

    println!();
    println!("↓↓↓ copy the token below ↓↓↓");
    println!();
    println!("{token}");
    println!();
    println!("↑↑↑ end of token ↑↑↑");
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_an_error() {
        assert!(resolve_credentials(None, Some("secret".into())).is_err());
    }

    #[test]
    fn missing_secret_is_an_error() {
        assert!(resolve_credentials(Some("key".into()), None).is_err());
    }

    #[test]
    fn empty_values_are_treated_as_missing() {
        assert!(resolve_credentials(Some("  ".into()), Some("secret".into())).is_err());
    }

    #[test]
    fn both_present_resolves() {
        let (key, secret) =
            resolve_credentials(Some("devkey".into()), Some("devsecret".into()))
                .expect("credentials should resolve");
        assert_eq!(key, "devkey");
        assert_eq!(secret, "devsecret");
    }
}
