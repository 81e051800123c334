//! Resource descriptor attached to every exported span and metric.

use opentelemetry::{Key, KeyValue, Value};
use opentelemetry_sdk::Resource;

use crate::error::{Error, Result};

/// Semantic conventions schema the explicit attributes follow.
pub const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.24.0";

const SERVICE_NAME: &str = "service.name";
const SERVICE_VERSION: &str = "service.version";

/// Immutable service identity shared by the trace and metric pipelines.
///
/// Cloning is cheap: the underlying SDK resource is reference counted.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    inner: Resource,
}

impl ResourceDescriptor {
    /// Build the descriptor for a service.
    ///
    /// Default detected attributes (SDK info, `OTEL_RESOURCE_ATTRIBUTES`) are
    /// merged with the explicit ones; explicit values win on key collision.
    pub fn build(
        service_name: &str,
        service_version: &str,
        environment_attrs: Vec<(String, String)>,
    ) -> Result<Self> {
        if service_name.trim().is_empty() {
            return Err(Error::Configuration("service name cannot be empty".into()));
        }

        let mut attributes: Vec<KeyValue> = environment_attrs
            .into_iter()
            .map(|(k, v)| KeyValue::new(k, v))
            .collect();
        // Pushed last so they override any same-named environment attribute.
        attributes.push(KeyValue::new(SERVICE_NAME, service_name.to_string()));
        attributes.push(KeyValue::new(SERVICE_VERSION, service_version.to_string()));

        let explicit = Resource::from_schema_url(attributes, SCHEMA_URL);
        Self::merge_checked(&Resource::default(), &explicit)
    }

    /// Merge `explicit` over `base`, rejecting conflicting schema URLs.
    pub fn merge_checked(base: &Resource, explicit: &Resource) -> Result<Self> {
        if let (Some(a), Some(b)) = (base.schema_url(), explicit.schema_url()) {
            if a != b {
                return Err(Error::Configuration(format!(
                    "conflicting resource schema URLs: {a} vs {b}"
                )));
            }
        }

        Ok(Self {
            inner: base.merge(explicit),
        })
    }

    /// Look up a single attribute.
    pub fn get(&self, key: &'static str) -> Option<Value> {
        self.inner.get(Key::from_static_str(key))
    }

    /// The `service.name` attribute.
    pub fn service_name(&self) -> Option<String> {
        self.get(SERVICE_NAME).map(|v| v.as_str().into_owned())
    }

    /// The SDK resource handed to providers.
    pub fn inner(&self) -> &Resource {
        &self.inner
    }
}
