//! Home Assistant REST client for room lookups.
//!
//! Each managed device can name a Home Assistant entity whose state is the
//! room the device is currently in (e.g. a Bermuda area sensor). All
//! failures collapse to None: a missing entity, a dead server, or an
//! `unknown`/`unavailable` state are all just "room unavailable".

use crate::config::{DeviceConfig, HomeAssistantConfig};
use crate::context::RoomProvider;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

pub struct HomeAssistant {
    client: reqwest::Client,
    base_url: String,
    token: String,
    devices: HashMap<String, DeviceConfig>,
}

#[derive(Debug, Deserialize)]
struct EntityState {
    #[serde(default)]
    state: String,
}

impl HomeAssistant {
    pub fn new(
        config: &HomeAssistantConfig,
        devices: HashMap<String, DeviceConfig>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            devices,
        })
    }

    async fn entity_state(&self, entity_id: &str) -> Option<String> {
        let url = format!("{}/api/states/{}", self.base_url, entity_id);
        let response = match self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(entity_id, error = %e, "Home Assistant request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(
                entity_id,
                status = %response.status(),
                "Home Assistant returned an error"
            );
            return None;
        }

        let entity: EntityState = match response.json().await {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(entity_id, error = %e, "Unparseable entity state");
                return None;
            }
        };

        match entity.state.as_str() {
            "" | "unknown" | "unavailable" => None,
            state => Some(state.to_string()),
        }
    }
}

#[async_trait]
impl RoomProvider for HomeAssistant {
    async fn device_room(&self, device_ip: &str) -> Option<String> {
        let entity_id = self.devices.get(device_ip)?.room_entity.as_deref()?;
        self.entity_state(entity_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(url: &str) -> HomeAssistant {
        let config = HomeAssistantConfig {
            url: url.to_string(),
            token: "token".to_string(),
            timeout_secs: 1,
        };
        let mut devices = HashMap::new();
        devices.insert(
            "10.0.0.2".to_string(),
            DeviceConfig {
                name: "Alex's phone".to_string(),
                kind: Some("phone".to_string()),
                room_entity: Some("sensor.alex_phone_room".to_string()),
            },
        );
        HomeAssistant::new(&config, devices).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_device_has_no_room() {
        let ha = provider("http://127.0.0.1:1");
        assert_eq!(ha.device_room("10.0.0.99").await, None);
    }

    #[tokio::test]
    async fn test_unreachable_server_degrades_to_none() {
        // Connection refused, not a hang: nothing listens on port 1.
        let ha = provider("http://127.0.0.1:1");
        assert_eq!(ha.device_room("10.0.0.2").await, None);
    }
}
