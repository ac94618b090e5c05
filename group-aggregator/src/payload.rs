use chrono::{DateTime, Utc};
use hyper::body::Bytes;

/// Attributes carried alongside a content body
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attributes {
    last_modified: Option<DateTime<Utc>>,
    content_type: Option<String>,
}

impl Attributes {
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    pub fn set_last_modified(&mut self, last_modified: DateTime<Utc>) {
        self.last_modified = Some(last_modified);
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }
}

/// A body with mutable attributes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Content {
    body: Bytes,
    attributes: Attributes,
}

impl Content {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            attributes: Attributes::default(),
        }
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.attributes.set_last_modified(last_modified);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.attributes.set_content_type(content_type);
        self
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }
}

/// The body of a member response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// Bytes only, no attributes
    Plain(Bytes),
    Content(Content),
}

impl Payload {
    pub fn body(&self) -> &Bytes {
        match self {
            Payload::Plain(body) => body,
            Payload::Content(content) => content.body(),
        }
    }

    /// Returns the attributes if this payload carries any
    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            Payload::Plain(_) => None,
            Payload::Content(content) => Some(content.attributes()),
        }
    }
}

impl From<Content> for Payload {
    fn from(content: Content) -> Self {
        Payload::Content(content)
    }
}
