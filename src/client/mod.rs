//! HTTP client for the test manager JSON API
//!
//! One client implements every collaborator contract that lives on the
//! manager: station telemetry, attenuator control, driver roam assist and
//! monitor provisioning.

use crate::attenuator::{AttenuatorChannel, AttenuatorInfo};
use crate::capture::MonitorSetup;
use crate::error::{AppError, Result};
use crate::station::{RoamAssist, StationField, StationTelemetry};
use crate::types::{ChannelSpec, ModuleId, StationId};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use std::time::Duration;

/// Modules per attenuator when the listing does not enumerate them
pub const DEFAULT_MODULE_COUNT: u8 = 8;

const USER_AGENT: &str = concat!("roam-timing-tester/", env!("CARGO_PKG_VERSION"));

/// Test manager client
#[derive(Debug, Clone)]
pub struct ManagerClient {
    client: Client,
    base: Url,
}

impl ManagerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// GET a JSON document; `Ok(None)` on 404
    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Option<Value>> {
        let url = self.base.join(path)?;
        let response = self
            .client
            .get(url.clone())
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(AppError::http(format!("GET {} returned {}", url, status))),
        }
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<()> {
        let url = self.base.join(path)?;
        let response = self.client.post(url.clone()).json(body).send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AppError::http(format!("POST {} returned {}", url, status)))
        }
    }

    async fn wifi_cli_cmd(&self, station: &StationId, command: &str) -> Result<()> {
        self.post_json(
            "cli-json/wifi_cli_cmd",
            &json!({
                "shelf": station.shelf,
                "resource": station.resource,
                "port": station.port,
                "wpa_cli_cmd": command,
            }),
        )
        .await
    }
}

/// Split an entity id (`shelf.resource.name`) into its parts; bare names live on 1.1
pub fn split_eid(eid: &str) -> Result<(u16, u16, String)> {
    let parts: Vec<&str> = eid.splitn(3, '.').collect();
    match parts.as_slice() {
        [name] if !name.is_empty() => Ok((1, 1, name.to_string())),
        [shelf, resource, name] if !name.is_empty() => {
            let shelf = shelf
                .parse()
                .map_err(|_| AppError::validation(format!("Invalid shelf in entity id '{}'", eid)))?;
            let resource = resource
                .parse()
                .map_err(|_| AppError::validation(format!("Invalid resource in entity id '{}'", eid)))?;
            Ok((shelf, resource, name.to_string()))
        }
        _ => Err(AppError::validation(format!("Invalid entity id '{}'", eid))),
    }
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse the attenuator listing.
///
/// The manager returns `{"attenuators": [{eid: {...}}, ...]}`, or
/// `{"attenuator": {...}}` when only one device is present.
pub fn parse_attenuator_listing(doc: &Value) -> Result<Vec<AttenuatorInfo>> {
    let entries: Vec<(String, &Value)> = if let Some(list) = doc.get("attenuators").and_then(Value::as_array) {
        list.iter()
            .filter_map(Value::as_object)
            .flat_map(|obj| obj.iter().map(|(k, v)| (k.clone(), v)))
            .collect()
    } else if let Some(single) = doc.get("attenuator") {
        let eid = single
            .get("entity id")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::parse("Attenuator entry without entity id"))?;
        vec![(eid.to_string(), single)]
    } else {
        return Err(AppError::parse("Attenuator listing has no 'attenuators' member"));
    };

    Ok(entries
        .into_iter()
        .map(|(serial, values)| {
            let phantom = values
                .get("state")
                .and_then(Value::as_str)
                .map_or(false, |s| s.eq_ignore_ascii_case("phantom"));
            let listed = values
                .as_object()
                .map_or(0, |obj| obj.keys().filter(|k| k.starts_with("module ")).count());
            let module_count = if listed == 0 {
                DEFAULT_MODULE_COUNT
            } else {
                u8::try_from(listed).unwrap_or(u8::MAX)
            };
            AttenuatorInfo { serial, module_count, phantom }
        })
        .collect())
}

#[async_trait]
impl StationTelemetry for ManagerClient {
    async fn query(&self, station: &StationId, field: StationField) -> Result<Option<String>> {
        let path = format!("port/{}/{}/{}", station.shelf, station.resource, station.port);
        let Some(doc) = self.get_json(&path, &[("fields", field.as_str())]).await? else {
            return Ok(None);
        };

        let interface = match doc.get("interface") {
            None | Some(Value::Null) => return Ok(None),
            Some(interface) => interface,
        };

        interface
            .get(field.as_str())
            .map(|v| Some(field_text(v)))
            .ok_or_else(|| AppError::telemetry(format!("{} has no '{}' field", station, field)))
    }
}

#[async_trait]
impl AttenuatorChannel for ManagerClient {
    async fn set_module(&self, module: &ModuleId, value: u16) -> Result<()> {
        let (shelf, resource, serno) = split_eid(&module.serial)?;
        self.post_json(
            "cli-json/set_attenuator",
            &json!({
                "shelf": shelf,
                "resource": resource,
                "serno": serno,
                "atten_idx": module.index,
                "val": value,
            }),
        )
        .await
    }

    async fn list_attenuators(&self) -> Result<Vec<AttenuatorInfo>> {
        match self.get_json("attenuators/", &[]).await? {
            Some(doc) => parse_attenuator_listing(&doc),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl RoamAssist for ManagerClient {
    async fn scan_trigger(&self, station: &StationId, frequencies: &[u32]) -> Result<()> {
        let freqs: Vec<String> = frequencies.iter().map(u32::to_string).collect();
        let command = if freqs.is_empty() {
            "scan trigger".to_string()
        } else {
            format!("scan trigger freq {}", freqs.join(" "))
        };
        self.wifi_cli_cmd(station, &command).await
    }

    async fn roam_command(&self, station: &StationId, command: &str) -> Result<()> {
        self.wifi_cli_cmd(station, command).await
    }
}

#[async_trait]
impl MonitorSetup for ManagerClient {
    async fn ensure_monitor(&self, radio: &str, interface: &str, channel: ChannelSpec) -> Result<()> {
        let (shelf, resource, radio_name) = split_eid(radio)?;

        let mut radio_cmd = json!({
            "shelf": shelf,
            "resource": resource,
            "radio": radio_name,
            "mode": "NA",
        });
        match channel {
            ChannelSpec::Channel(c) => radio_cmd["channel"] = json!(c),
            ChannelSpec::FrequencyMhz(mhz) => radio_cmd["frequency"] = json!(mhz),
        }
        self.post_json("cli-json/set_wifi_radio", &radio_cmd).await?;

        self.post_json(
            "cli-json/add_monitor",
            &json!({
                "shelf": shelf,
                "resource": resource,
                "radio": radio_name,
                "ap_name": interface,
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> ManagerClient {
        ManagerClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_port_field_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/port/1/1/sta0000"))
            .and(query_param("fields", "ap"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "interface": {"ap": "94:a6:7e:54:d4:31"}
            })))
            .mount(&server)
            .await;

        let value = client(&server)
            .await
            .query(&StationId::new(1, 1, "sta0000"), StationField::Bssid)
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("94:a6:7e:54:d4:31"));
    }

    #[tokio::test]
    async fn test_missing_port_is_vanished() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/port/1/1/sta0404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/port/1/1/sta0001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"handler": "port"})))
            .mount(&server)
            .await;

        let client = client(&server).await;
        assert!(client.query(&StationId::new(1, 1, "sta0404"), StationField::Bssid).await.unwrap().is_none());
        assert!(client.query(&StationId::new(1, 1, "sta0001"), StationField::Bssid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .query(&StationId::new(1, 1, "sta0000"), StationField::Signal)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "HTTP");
    }

    #[tokio::test]
    async fn test_set_attenuator_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cli-json/set_attenuator"))
            .and(body_json(json!({
                "shelf": 1,
                "resource": 1,
                "serno": "3034",
                "atten_idx": 2,
                "val": 950,
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .await
            .set_module(&"1.1.3034.2".parse().unwrap(), 950)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_roam_assist_commands() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cli-json/wifi_cli_cmd"))
            .and(body_json(json!({
                "shelf": 1,
                "resource": 1,
                "port": "sta0000",
                "wpa_cli_cmd": "scan trigger freq 5180 5300",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/cli-json/wifi_cli_cmd"))
            .and(body_json(json!({
                "shelf": 1,
                "resource": 1,
                "port": "sta0000",
                "wpa_cli_cmd": "ft_ds 94:A6:7E:54:D4:33",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server).await;
        let station = StationId::new(1, 1, "sta0000");
        client.scan_trigger(&station, &[5180, 5300]).await.unwrap();
        client.roam_command(&station, "ft_ds 94:A6:7E:54:D4:33").await.unwrap();
    }

    #[tokio::test]
    async fn test_monitor_provisioning() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cli-json/set_wifi_radio"))
            .and(body_json(json!({
                "shelf": 1, "resource": 1, "radio": "wiphy1", "mode": "NA", "channel": 36,
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/cli-json/add_monitor"))
            .and(body_json(json!({
                "shelf": 1, "resource": 1, "radio": "wiphy1", "ap_name": "moni0a",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .await
            .ensure_monitor("1.1.wiphy1", "moni0a", ChannelSpec::Channel(36))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_attenuators() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/attenuators/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "attenuators": [
                    {"1.1.3034": {"state": "Active", "module 1": 0, "module 2": 0, "module 3": 0, "module 4": 0}},
                    {"1.1.1005": {"state": "Phantom"}}
                ]
            })))
            .mount(&server)
            .await;

        let list = client(&server).await.list_attenuators().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].serial, "1.1.3034");
        assert_eq!(list[0].module_count, 4);
        assert!(!list[0].phantom);
        assert!(list[1].phantom);
        assert_eq!(list[1].module_count, DEFAULT_MODULE_COUNT);
    }

    #[test]
    fn test_single_attenuator_listing() {
        let doc = json!({"attenuator": {"entity id": "1.1.3034", "state": "Active"}});
        let list = parse_attenuator_listing(&doc).unwrap();
        assert_eq!(list[0].serial, "1.1.3034");
        assert!(parse_attenuator_listing(&json!({})).is_err());
    }

    #[test]
    fn test_split_eid() {
        assert_eq!(split_eid("1.2.wiphy1").unwrap(), (1, 2, "wiphy1".to_string()));
        assert_eq!(split_eid("3034").unwrap(), (1, 1, "3034".to_string()));
        assert!(split_eid("x.1.wiphy1").is_err());
        assert!(split_eid("1.1.").is_err());
    }

    #[test]
    fn test_base_url_keeps_path() {
        let client = ManagerClient::new("http://manager:8080/api", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url().join("attenuators/").unwrap().as_str(), "http://manager:8080/api/attenuators/");
    }
}
