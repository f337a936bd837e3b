//! arXiv export API client.
//!
//! arXiv pages are never scraped; the Atom record from the export API is the
//! source of truth for title, abstract and the PDF link.

use std::time::Instant;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::retrieval::extractor::{ExtractDepth, NotExtractable};

pub const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

/// Entry id prefix of the record the export API returns for a bad id.
const ERROR_ENTRY_PREFIX: &str = "http://arxiv.org/api/errors";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArxivRecord {
    pub title: String,
    pub summary: String,
    pub published: String,
    pub authors: Vec<String>,
    pub pdf_link: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

/// Parse the first `<entry>` of an arXiv Atom feed.
pub fn parse_feed(xml: &str) -> Result<ArxivRecord, String> {
    let mut reader = Reader::from_str(xml);
    let mut record = ArxivRecord::default();
    let mut in_entry = false;
    let mut in_author = false;
    let mut field: Option<Field> = None;
    let mut raw = String::new();
    let mut entry_id = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"entry" if !in_entry => in_entry = true,
                b"author" if in_entry => in_author = true,
                b"link" if in_entry => read_link(&e, &mut record),
                name if in_entry => {
                    field = match name {
                        b"id" if !in_author => Some(Field::Id),
                        b"title" => Some(Field::Title),
                        b"summary" => Some(Field::Summary),
                        b"published" => Some(Field::Published),
                        b"name" if in_author => Some(Field::AuthorName),
                        _ => None,
                    };
                    raw.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if in_entry && e.local_name().as_ref() == b"link" {
                    read_link(&e, &mut record);
                }
            }
            Ok(Event::Text(text)) => {
                if field.is_some() {
                    raw.push_str(&String::from_utf8_lossy(&text));
                }
            }
            Ok(Event::GeneralRef(reference)) => {
                if field.is_some() {
                    raw.push('&');
                    raw.push_str(&String::from_utf8_lossy(&reference));
                    raw.push(';');
                }
            }
            Ok(Event::CData(data)) => {
                if field.is_some() {
                    let literal = String::from_utf8_lossy(&data).into_owned();
                    raw.push_str(&quick_xml::escape::escape(literal.as_str()));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"entry" if in_entry => break,
                b"author" => in_author = false,
                _ => {
                    if let Some(done) = field.take() {
                        let value = collapse_whitespace(&unescape_lossy(&raw));
                        match done {
                            Field::Id => entry_id = value,
                            Field::Title => record.title = value,
                            Field::Summary => record.summary = value,
                            Field::Published => record.published = value,
                            Field::AuthorName => record.authors.push(value),
                        }
                        raw.clear();
                    }
                }
            },
            Ok(Event::Eof) => break,
            Err(err) => return Err(format!("invalid arXiv feed: {err}")),
            _ => {}
        }
    }

    if !in_entry {
        return Err("arXiv feed contains no entry".to_string());
    }
    if entry_id.starts_with(ERROR_ENTRY_PREFIX) {
        return Err(format!("arXiv rejected the id: {}", record.summary));
    }
    if record.summary.is_empty() {
        return Err("arXiv entry has no summary".to_string());
    }
    Ok(record)
}

fn read_link(element: &BytesStart, record: &mut ArxivRecord) {
    let mut href = None;
    let mut is_pdf = false;
    for attribute in element.attributes().flatten() {
        let value = unescape_lossy(&String::from_utf8_lossy(&attribute.value));
        match attribute.key.local_name().as_ref() {
            b"href" => href = Some(value),
            b"title" => is_pdf = value == "pdf",
            _ => {}
        }
    }
    if is_pdf {
        record.pdf_link = href;
    }
}

fn unescape_lossy(raw: &str) -> String {
    quick_xml::escape::unescape(raw)
        .map(|text| text.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop bracketed arXiv identifiers such as `[2401.01234]` from a search
/// result title.
pub fn clean_title(title: &str) -> String {
    let mut cleaned = String::with_capacity(title.len());
    let mut rest = title;

    while let Some(open) = rest.find('[') {
        let (before, from_open) = rest.split_at(open);
        cleaned.push_str(before);
        match from_open.find(']') {
            Some(close) if is_arxiv_identifier(&from_open[1..close]) => {
                rest = &from_open[close + 1..];
            }
            _ => {
                cleaned.push('[');
                rest = &from_open[1..];
            }
        }
    }
    cleaned.push_str(rest);

    collapse_whitespace(&cleaned)
}

fn is_arxiv_identifier(text: &str) -> bool {
    match text.split_once('.') {
        Some((left, right)) => {
            !left.is_empty()
                && !right.is_empty()
                && left.chars().all(|c| c.is_ascii_digit())
                && right.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Extract text from PDF bytes off the async runtime; a panicking parser is
/// reported as a parse failure.
pub(crate) async fn pdf_text(url: &str, bytes: Vec<u8>) -> Result<String, NotExtractable> {
    let outcome =
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes)).await;
    match outcome {
        Ok(Ok(text)) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        Ok(Ok(_)) => Err(NotExtractable::Empty {
            url: url.to_string(),
        }),
        Ok(Err(err)) => Err(NotExtractable::Parse {
            url: url.to_string(),
            message: err.to_string(),
        }),
        Err(err) => Err(NotExtractable::Parse {
            url: url.to_string(),
            message: format!("PDF parser aborted: {err}"),
        }),
    }
}

#[derive(Clone)]
pub struct ArxivClient {
    client: reqwest::Client,
    api_url: String,
}

impl ArxivClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_api_url(client, ARXIV_API_URL)
    }

    pub fn with_api_url(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }

    pub async fn fetch_record(&self, id: &str) -> Result<ArxivRecord, NotExtractable> {
        let start_time = Instant::now();
        let url = format!("{}?id_list={}", self.api_url, urlencoding::encode(id));
        let body = get_bytes(&self.client, &url).await?;
        let xml = String::from_utf8_lossy(&body);
        let record = parse_feed(&xml).map_err(|message| NotExtractable::Parse {
            url: url.clone(),
            message,
        })?;

        debug!(
            id = %id,
            title = %record.title,
            authors = record.authors.len(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "arXiv record fetched"
        );
        Ok(record)
    }

    /// The abstract, or the full paper body when `depth` asks for it. A full
    /// text request falls back to the abstract if the PDF cannot be read.
    pub async fn fetch_text(&self, id: &str, depth: ExtractDepth) -> Result<String, NotExtractable> {
        let record = self.fetch_record(id).await?;

        if depth == ExtractDepth::FullText {
            if let Some(pdf_link) = &record.pdf_link {
                match self.fetch_pdf_text(pdf_link).await {
                    Ok(text) => return Ok(text),
                    Err(err) => {
                        warn!(id = %id, error = %err, "Falling back to arXiv abstract");
                    }
                }
            }
        }

        Ok(record.summary)
    }

    async fn fetch_pdf_text(&self, pdf_link: &str) -> Result<String, NotExtractable> {
        let bytes = get_bytes(&self.client, pdf_link).await?;
        pdf_text(pdf_link, bytes).await
    }
}

async fn get_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, NotExtractable> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|err| NotExtractable::from_transport(url, err))?;

    let status = response.status();
    if !status.is_success() {
        return Err(NotExtractable::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response
        .bytes()
        .await
        .map(|bytes| bytes.to_vec())
        .map_err(|err| NotExtractable::from_transport(url, err))
}
