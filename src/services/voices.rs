//! # Voice Catalog Collaborator
//!
//! Lookup of synthesizer voice identities (by name, or randomly within a
//! locale/gender) backed by a process-wide, time-bounded cache of the voice
//! listing.
//!
//! ## Cache semantics:
//! Read-mostly with a fixed TTL. Refresh is not mutually exclusive — two
//! sessions may refresh concurrently and one result wins — because a stale
//! read is harmless here. If a refresh fails while a stale copy exists, the
//! stale copy is served rather than failing the lookup.

use crate::config::ServicesConfig;
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// One entry from the voice catalog listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    pub voice_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

/// Contract for the voice-catalog collaborator.
#[async_trait]
pub trait VoiceDirectory: Send + Sync {
    /// Find a voice whose id or display name contains `name`
    /// (case-insensitive). Returns `None` when nothing matches.
    async fn find_voice_by_name(&self, name: &str) -> SessionResult<Option<String>>;

    /// Pick a random voice whose locale starts with `locale_prefix`,
    /// optionally restricted by gender.
    async fn random_voice(&self, locale_prefix: &str, gender: Option<&str>) -> SessionResult<String>;
}

struct CachedVoices {
    voices: Vec<Voice>,
    fetched_at: Instant,
}

/// Murf voice listing implementation of [`VoiceDirectory`] with a TTL cache.
pub struct MurfVoiceDirectory {
    client: reqwest::Client,
    api_key: String,
    url: String,
    ttl: Duration,
    cache: RwLock<Option<CachedVoices>>,
}

impl MurfVoiceDirectory {
    pub fn new(api_key: String, services: &ServicesConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(services.request_timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            url: services.voices_url.clone(),
            ttl: Duration::from_secs(services.voice_cache_ttl_secs),
            cache: RwLock::new(None),
        }
    }

    /// Return the cached listing, refreshing it when the TTL has expired.
    async fn voices(&self) -> SessionResult<Vec<Voice>> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.voices.clone());
                }
            }
        }

        match self.fetch_voices().await {
            Ok(voices) => {
                debug!(count = voices.len(), "refreshed voice catalog");
                let mut cache = self.cache.write().await;
                *cache = Some(CachedVoices {
                    voices: voices.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(voices)
            }
            Err(e) => {
                // Serve the stale listing if we have one; voices change rarely
                let cache = self.cache.read().await;
                if let Some(cached) = cache.as_ref() {
                    warn!(error = %e, "voice catalog refresh failed, serving stale listing");
                    return Ok(cached.voices.clone());
                }
                Err(e)
            }
        }
    }

    async fn fetch_voices(&self) -> SessionResult<Vec<Voice>> {
        let response = self
            .client
            .get(&self.url)
            .header("api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| SessionError::from_request(e, "voice catalog"))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(SessionError::Service(format!(
                "voice catalog returned {}: {}",
                status, error_body
            )));
        }

        response
            .json::<Vec<Voice>>()
            .await
            .map_err(|e| SessionError::from_request(e, "voice catalog"))
    }
}

#[async_trait]
impl VoiceDirectory for MurfVoiceDirectory {
    async fn find_voice_by_name(&self, name: &str) -> SessionResult<Option<String>> {
        let voices = self.voices().await?;
        Ok(find_in_listing(&voices, name))
    }

    async fn random_voice(&self, locale_prefix: &str, gender: Option<&str>) -> SessionResult<String> {
        let voices = self.voices().await?;
        let matches = filter_listing(&voices, locale_prefix, gender);

        if matches.is_empty() {
            return Err(SessionError::Service(format!(
                "no voices found for locale {} gender {:?}",
                locale_prefix, gender
            )));
        }

        let index = rand::thread_rng().gen_range(0..matches.len());
        Ok(matches[index].voice_id.clone())
    }
}

fn find_in_listing(voices: &[Voice], name: &str) -> Option<String> {
    let needle = name.to_lowercase();
    voices
        .iter()
        .find(|voice| {
            voice.voice_id.to_lowercase().contains(&needle)
                || voice
                    .display_name
                    .as_deref()
                    .map(|display| display.to_lowercase().contains(&needle))
                    .unwrap_or(false)
        })
        .map(|voice| voice.voice_id.clone())
}

fn filter_listing<'a>(
    voices: &'a [Voice],
    locale_prefix: &str,
    gender: Option<&str>,
) -> Vec<&'a Voice> {
    let locale_prefix = locale_prefix.to_lowercase();
    voices
        .iter()
        .filter(|voice| {
            let locale_matches = voice
                .locale
                .as_deref()
                .map(|locale| locale.to_lowercase().starts_with(&locale_prefix))
                .unwrap_or(false);

            let gender_matches = match gender {
                Some(wanted) => voice
                    .gender
                    .as_deref()
                    .map(|g| g.eq_ignore_ascii_case(wanted))
                    .unwrap_or(false),
                None => true,
            };

            locale_matches && gender_matches
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> Vec<Voice> {
        vec![
            Voice {
                voice_id: "en-US-cooper".to_string(),
                display_name: Some("Cooper".to_string()),
                locale: Some("en-US".to_string()),
                gender: Some("Male".to_string()),
            },
            Voice {
                voice_id: "en-UK-hazel".to_string(),
                display_name: Some("Hazel".to_string()),
                locale: Some("en-UK".to_string()),
                gender: Some("Female".to_string()),
            },
            Voice {
                voice_id: "fr-FR-adelie".to_string(),
                display_name: Some("Adelie".to_string()),
                locale: Some("fr-FR".to_string()),
                gender: Some("Female".to_string()),
            },
        ]
    }

    #[test]
    fn test_find_by_name_matches_id_and_display_name() {
        let voices = listing();
        assert_eq!(
            find_in_listing(&voices, "cooper"),
            Some("en-US-cooper".to_string())
        );
        assert_eq!(
            find_in_listing(&voices, "Hazel"),
            Some("en-UK-hazel".to_string())
        );
        assert_eq!(find_in_listing(&voices, "imani"), None);
    }

    #[test]
    fn test_filter_by_locale_and_gender() {
        let voices = listing();

        let english = filter_listing(&voices, "en", None);
        assert_eq!(english.len(), 2);

        let english_female = filter_listing(&voices, "en", Some("female"));
        assert_eq!(english_female.len(), 1);
        assert_eq!(english_female[0].voice_id, "en-UK-hazel");

        let german = filter_listing(&voices, "de", None);
        assert!(german.is_empty());
    }

    #[test]
    fn test_listing_deserializes_catalog_shape() {
        let raw = r#"[{"voiceId": "en-US-ryan", "displayName": "Ryan", "locale": "en-US", "gender": "Male"}]"#;
        let voices: Vec<Voice> = serde_json::from_str(raw).unwrap();
        assert_eq!(voices[0].voice_id, "en-US-ryan");
        assert_eq!(voices[0].locale.as_deref(), Some("en-US"));
    }
}
