use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// A cleaned text excerpt plus the source it came from.
///
/// `link` is the identity of a reference: two references with the same link
/// are the same source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub title: String,
    pub link: String,
    pub content: String,
}

/// Image payload attached to a user turn.
///
/// Inline images are carried as `data:` URIs at every boundary (wire and
/// disk); remote images keep whatever URL they were given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Inline { mime: String, data: Vec<u8> },
    Remote(String),
}

impl ImageSource {
    pub fn inline(mime: impl Into<String>, data: Vec<u8>) -> Self {
        ImageSource::Inline {
            mime: mime.into(),
            data,
        }
    }

    pub fn to_uri(&self) -> String {
        match self {
            ImageSource::Inline { mime, data } => {
                format!("data:{mime};base64,{}", BASE64.encode(data))
            }
            ImageSource::Remote(url) => url.clone(),
        }
    }

    pub fn from_uri(uri: &str) -> Result<Self, String> {
        let Some(rest) = uri.strip_prefix("data:") else {
            return Ok(ImageSource::Remote(uri.to_string()));
        };

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| "data URI is missing its payload separator".to_string())?;

        match header.strip_suffix(";base64") {
            Some(mime) => {
                let data = BASE64
                    .decode(payload.trim())
                    .map_err(|err| format!("invalid base64 image payload: {err}"))?;
                Ok(ImageSource::Inline {
                    mime: mime.to_string(),
                    data,
                })
            }
            None => Ok(ImageSource::Inline {
                mime: header.to_string(),
                data: urlencoding::decode_binary(payload.as_bytes()).into_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Text(String),
    Image(ImageSource),
    References(Vec<Reference>),
}

impl ContentBlock {
    pub fn is_image(&self) -> bool {
        matches!(self, ContentBlock::Image(_))
    }
}

/// One entry of a conversation.
///
/// The role is fixed at construction. Blocks keep their insertion order
/// through persistence and reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredMessage", into = "StoredMessage")]
pub struct Message {
    role: Role,
    blocks: Vec<ContentBlock>,
    reasoning: Option<String>,
}

impl Message {
    pub fn new(role: Role, blocks: Vec<ContentBlock>) -> Self {
        Self {
            role,
            blocks,
            reasoning: None,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::Text(text.into())])
    }

    pub fn assistant(content: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            blocks: vec![ContentBlock::Text(content.into())],
            reasoning: Some(reasoning.into()),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    pub fn reasoning(&self) -> Option<&str> {
        self.reasoning.as_deref()
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_assistant(&self) -> bool {
        self.role.is_assistant()
    }

    pub fn has_image(&self) -> bool {
        self.blocks.iter().any(ContentBlock::is_image)
    }

    /// Text blocks joined with a single space, the way they are flattened for
    /// text-only models.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageSource> {
        self.blocks.iter().filter_map(|block| match block {
            ContentBlock::Image(image) => Some(image),
            _ => None,
        })
    }

    pub fn references(&self) -> Option<&[Reference]> {
        self.blocks.iter().find_map(|block| match block {
            ContentBlock::References(references) => Some(references.as_slice()),
            _ => None,
        })
    }

    /// Attach retrieved references, replacing any block already present.
    pub fn set_references(&mut self, references: Vec<Reference>) {
        if let Some(existing) = self.blocks.iter_mut().find_map(|block| match block {
            ContentBlock::References(existing) => Some(existing),
            _ => None,
        }) {
            *existing = references;
            return;
        }
        self.blocks.push(ContentBlock::References(references));
    }
}

/// Builder for the live user turn: images first, then text, matching the
/// order the chat input produces them.
///
/// A turn may carry several images (one block each), so a multi-file upload
/// stays one message. Every other block kind appears at most once; see
/// [`Message::set_references`].
#[derive(Debug, Clone, Default)]
pub struct UserTurn {
    pub text: String,
    pub images: Vec<ImageSource>,
}

impl UserTurn {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            images: Vec::new(),
        }
    }

    pub fn with_image(mut self, image: ImageSource) -> Self {
        self.images.push(image);
        self
    }

    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }

    pub fn into_message(self) -> Message {
        let mut blocks: Vec<ContentBlock> =
            self.images.into_iter().map(ContentBlock::Image).collect();
        let text = self.text.trim();
        if !text.is_empty() || blocks.is_empty() {
            blocks.push(ContentBlock::Text(text.to_string()));
        }
        Message::new(Role::User, blocks)
    }
}

#[derive(Serialize, Deserialize)]
struct StoredMessage {
    role: Role,
    content: StoredContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reasoning: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StoredContent {
    Plain(String),
    Blocks(Vec<StoredBlock>),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StoredBlock {
    Text { text: String },
    ImageUrl { image_url: StoredImageUrl },
    Reference { reference: Vec<Reference> },
}

#[derive(Serialize, Deserialize)]
struct StoredImageUrl {
    url: String,
}

impl From<Message> for StoredMessage {
    fn from(message: Message) -> Self {
        let Message {
            role,
            mut blocks,
            reasoning,
        } = message;

        let content = if matches!(blocks.as_slice(), [ContentBlock::Text(_)]) {
            match blocks.pop() {
                Some(ContentBlock::Text(text)) => StoredContent::Plain(text),
                _ => unreachable!("single text block checked above"),
            }
        } else {
            StoredContent::Blocks(
                blocks
                    .into_iter()
                    .map(|block| match block {
                        ContentBlock::Text(text) => StoredBlock::Text { text },
                        ContentBlock::Image(image) => StoredBlock::ImageUrl {
                            image_url: StoredImageUrl {
                                url: image.to_uri(),
                            },
                        },
                        ContentBlock::References(reference) => StoredBlock::Reference { reference },
                    })
                    .collect(),
            )
        };

        StoredMessage {
            role,
            content,
            reasoning,
        }
    }
}

impl TryFrom<StoredMessage> for Message {
    type Error = String;

    fn try_from(stored: StoredMessage) -> Result<Self, Self::Error> {
        let blocks = match stored.content {
            StoredContent::Plain(text) => vec![ContentBlock::Text(text)],
            StoredContent::Blocks(blocks) => blocks
                .into_iter()
                .map(|block| {
                    Ok(match block {
                        StoredBlock::Text { text } => ContentBlock::Text(text),
                        StoredBlock::ImageUrl { image_url } => {
                            ContentBlock::Image(ImageSource::from_uri(&image_url.url)?)
                        }
                        StoredBlock::Reference { reference } => {
                            ContentBlock::References(reference)
                        }
                    })
                })
                .collect::<Result<Vec<_>, String>>()?,
        };

        Ok(Message {
            role: stored.role,
            blocks,
            reasoning: stored.reasoning,
        })
    }
}
