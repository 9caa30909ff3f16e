//! Read-only lookups (datacenters, images, server options)

use crate::error::{CloudError, ConfigIssue, RemoteError, Result, ValidationError};
use crate::remote::RemoteClient;
use crate::wire::{WireDatacenter, WireImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Datacenter selector; every given field must match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatacenterQuery {
    pub id: Option<String>,
    pub country: Option<String>,

    /// City name, e.g. `Petach Tikva`
    pub name: Option<String>,
}

impl DatacenterQuery {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn by_location(country: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            country: Some(country.into()),
            name: Some(name.into()),
        }
    }

    fn matches(&self, dc: &WireDatacenter) -> bool {
        self.id.as_ref().is_none_or(|id| *id == dc.id)
            && self.country.as_ref().is_none_or(|c| *c == dc.name)
            && self.name.as_ref().is_none_or(|n| *n == dc.sub_category)
    }

    fn describe(&self) -> String {
        describe_fields(&[
            ("id", &self.id),
            ("country", &self.country),
            ("name", &self.name),
        ])
    }
}

/// A resolved datacenter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datacenter {
    pub id: String,
    pub country: String,
    pub name: String,
}

/// Image selector within one datacenter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageQuery {
    pub datacenter: String,
    pub id: Option<String>,
    pub os: Option<String>,
    pub code: Option<String>,

    /// Private images are not listed; the name is used as the image id as-is
    pub private_image_name: Option<String>,
}

impl ImageQuery {
    pub fn new(datacenter: impl Into<String>) -> Self {
        Self {
            datacenter: datacenter.into(),
            ..Default::default()
        }
    }

    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = Some(os.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn private(datacenter: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            datacenter: datacenter.into(),
            private_image_name: Some(name.into()),
            ..Default::default()
        }
    }

    fn matches(&self, image: &WireImage) -> bool {
        self.id.as_ref().is_none_or(|id| *id == image.id)
            && self.os.as_ref().is_none_or(|os| *os == image.os)
            && self.code.as_ref().is_none_or(|code| *code == image.code)
    }

    fn describe(&self) -> String {
        describe_fields(&[("id", &self.id), ("os", &self.os), ("code", &self.code)])
    }
}

/// A resolved image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub datacenter: String,
    pub os: String,
    pub code: String,
    pub name: String,
    pub private: bool,
}

pub async fn resolve_datacenter<R: RemoteClient + ?Sized>(
    remote: &R,
    query: &DatacenterQuery,
) -> Result<Datacenter> {
    let datacenters = remote.list_datacenters().await?;
    let matched: Vec<&WireDatacenter> = datacenters.iter().filter(|dc| query.matches(dc)).collect();
    debug!(query = %query.describe(), matches = matched.len(), "resolving datacenter");

    match matched.as_slice() {
        [dc] => Ok(Datacenter {
            id: dc.id.clone(),
            country: dc.name.clone(),
            name: dc.sub_category.clone(),
        }),
        _ => Err(RemoteError::ReferenceNotFound {
            kind: "datacenter",
            reference: query.describe(),
            available: datacenters
                .iter()
                .map(|dc| format!("{} ({}, {})", dc.id, dc.name, dc.sub_category))
                .collect(),
        }
        .into()),
    }
}

pub async fn resolve_image<R: RemoteClient + ?Sized>(remote: &R, query: &ImageQuery) -> Result<Image> {
    if let Some(name) = &query.private_image_name {
        if query.os.is_some() || query.code.is_some() || query.id.is_some() {
            return Err(CloudError::Validation(ValidationError::InvalidConfiguration(vec![
                ConfigIssue::ConflictingImageSelectors,
            ])));
        }
        return Ok(Image {
            id: name.clone(),
            datacenter: query.datacenter.clone(),
            os: String::new(),
            code: String::new(),
            name: name.clone(),
            private: true,
        });
    }

    let images = remote.list_images(&query.datacenter).await?;
    let matched: Vec<&WireImage> = images.iter().filter(|image| query.matches(image)).collect();
    debug!(
        datacenter = %query.datacenter,
        query = %query.describe(),
        matches = matched.len(),
        "resolving image"
    );

    match matched.as_slice() {
        [image] => Ok(Image {
            id: image.id.clone(),
            datacenter: query.datacenter.clone(),
            os: image.os.clone(),
            code: image.code.clone(),
            name: image.name.clone(),
            private: false,
        }),
        _ => Err(RemoteError::ReferenceNotFound {
            kind: "image",
            reference: query.describe(),
            available: images
                .iter()
                .map(|image| format!("{} (os={}, code={})", image.id, image.os, image.code))
                .collect(),
        }
        .into()),
    }
}

fn describe_fields(fields: &[(&str, &Option<String>)]) -> String {
    let parts: Vec<String> = fields
        .iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| format!("{key}={v}")))
        .collect();
    if parts.is_empty() {
        "<any>".to_string()
    } else {
        parts.join(",")
    }
}
