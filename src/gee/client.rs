//! REST client for the geospatial platform.
//!
//! Three operations cover every script in the workflow: synchronous value
//! computation (`value:compute`) for per-point reductions, asynchronous table
//! exports (`table:export`) for the quarterly batch jobs, and a status lookup
//! for submitted operations. Transient per-call failures surface as errors so
//! callers can decide whether a point degrades to null or the run aborts.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};

use crate::gee::auth::Authenticator;
use crate::gee::expression;
use crate::Config;

// ---

pub struct EeClient {
    // ---
    http: reqwest::Client,
    auth: Authenticator,
    base: String,
    project: String,
}

impl EeClient {
    // ---
    pub fn new(config: &Config) -> Result<Self> {
        // ---
        Ok(EeClient {
            http: reqwest::Client::new(),
            auth: Authenticator::from_key_file(&config.gee_key_path)?,
            base: config.gee_api_url.trim_end_matches('/').to_string(),
            project: config.gee_project.clone(),
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        // ---
        let url = format!("{}/projects/{}/{}", self.base, self.project, path);
        let token = self.auth.bearer_token().await?;

        tracing::debug!("POST {}", url);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("{} returned {}: {}", url, status, text));
        }

        Ok(resp.json().await?)
    }

    /// Evaluate an expression graph server-side and return its result value.
    pub async fn compute_value(&self, root: Value) -> Result<Value> {
        // ---
        let response = self.post("value:compute", &expression::envelope(root)).await?;
        response
            .get("result")
            .cloned()
            .ok_or_else(|| anyhow!("value:compute response missing 'result' field"))
    }

    /// Spatial mean of `image` over `geometry` at `scale` meters. The platform
    /// answers with a band-name → scalar dictionary; bands with no unmasked
    /// pixels come back null and are preserved as `None`.
    pub async fn reduce_region_mean(
        &self,
        image: Value,
        geometry: Value,
        scale: f64,
    ) -> Result<BTreeMap<String, Option<f64>>> {
        // ---
        let result = self
            .compute_value(expression::reduce_region_mean(image, geometry, scale))
            .await?;

        let object = result
            .as_object()
            .ok_or_else(|| anyhow!("reduceRegion result is not a dictionary: {}", result))?;

        let mut bands = BTreeMap::new();
        for (name, value) in object {
            bands.insert(name.clone(), value.as_f64());
        }
        Ok(bands)
    }

    /// Number of images surviving a collection's filters.
    pub async fn collection_size(&self, collection: Value) -> Result<u64> {
        // ---
        let result = self
            .compute_value(expression::collection_size(collection))
            .await?;
        result
            .as_u64()
            .ok_or_else(|| anyhow!("collection size is not an integer: {}", result))
    }

    /// Submit an asynchronous table export to a Drive folder and return the
    /// operation name. The job runs entirely server-side; callers only get a
    /// handle to poll.
    pub async fn export_table(
        &self,
        table: Value,
        description: &str,
        file_name_prefix: &str,
        folder: &str,
    ) -> Result<String> {
        // ---
        let mut body = expression::envelope(table);
        body["description"] = json!(description);
        body["fileExportOptions"] = json!({
            "fileFormat": "CSV",
            "driveDestination": {
                "folder": folder,
                "filenamePrefix": file_name_prefix,
            }
        });

        let response = self.post("table:export", &body).await?;
        response
            .get("name")
            .and_then(|n| n.as_str())
            .map(String::from)
            .ok_or_else(|| anyhow!("table:export response missing operation name"))
    }

    /// One-shot status snapshot of a submitted export; no polling loop, the
    /// operator checks and re-runs by hand.
    pub async fn operation_state(&self, operation_name: &str) -> Result<String> {
        // ---
        let url = format!("{}/{}", self.base, operation_name);
        let token = self.auth.bearer_token().await?;

        let response: Value = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("failed to fetch status of {}", operation_name))?
            .json()
            .await?;

        Ok(response
            .pointer("/metadata/state")
            .and_then(|s| s.as_str())
            .unwrap_or("UNKNOWN")
            .to_string())
    }
}
