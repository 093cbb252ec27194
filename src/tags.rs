use camino::{Utf8Path, Utf8PathBuf};
use little_exif::exif_tag::ExifTag;
use little_exif::metadata::Metadata;
use serde::Serialize;
use tracing::warn;

use crate::catalog;
use crate::domain::ArchiveEntry;
use crate::error::FeedError;

const COPYRIGHT_MARK: char = '©';

/// Descriptive fields stored alongside a saved image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageTags {
    pub title: String,
    pub author: String,
    pub comment: String,
    pub keywords: String,
}

impl ImageTags {
    pub fn from_entry(entry: &ArchiveEntry) -> Self {
        let (title, author) = split_copyright(&entry.copyright);
        Self {
            title,
            author,
            comment: entry.headline.clone(),
            keywords: chrono::Local::now().format("%Y-%m-%d").to_string(),
        }
    }
}

/// Splits a feed copyright line into `(title, author)`.
///
/// `"Lighthouse at dawn, Maine (© Jane Doe/Getty Images)"` yields
/// `("Lighthouse at dawn, Maine", "Jane Doe/Getty Images")`. Without a `©` the whole line is the
/// title and the author is empty.
pub fn split_copyright(copyright: &str) -> (String, String) {
    let Some(mark) = copyright.rfind(COPYRIGHT_MARK) else {
        return (copyright.trim().to_string(), String::new());
    };
    let title = copyright[..mark]
        .trim()
        .trim_end_matches('(')
        .trim()
        .to_string();
    let rest = &copyright[mark + COPYRIGHT_MARK.len_utf8()..];
    let author = match rest.rfind(')') {
        Some(close) => &rest[..close],
        None => rest,
    };
    (title, author.trim().to_string())
}

/// Attaches [`ImageTags`] to a committed image.
pub trait TagWriter {
    fn write_tags(&self, image: &Utf8Path, tags: &ImageTags) -> Result<(), FeedError>;
}

/// Writes tags as a JSON document named after the image into a side directory.
#[derive(Debug, Clone)]
pub struct SidecarTagWriter {
    dir: Utf8PathBuf,
}

impl SidecarTagWriter {
    pub fn new(dir: Utf8PathBuf) -> Self {
        Self { dir }
    }

    pub fn sidecar_path(&self, image: &Utf8Path) -> Utf8PathBuf {
        let name = image.file_name().unwrap_or("image");
        self.dir.join(format!("{name}.json"))
    }
}

#[derive(Serialize)]
struct SidecarFile<'a> {
    image: &'a str,
    tool: String,
    #[serde(flatten)]
    tags: &'a ImageTags,
}

impl TagWriter for SidecarTagWriter {
    fn write_tags(&self, image: &Utf8Path, tags: &ImageTags) -> Result<(), FeedError> {
        let sidecar = SidecarFile {
            image: image.file_name().unwrap_or_default(),
            tool: format!("feedkeeper/{}", env!("CARGO_PKG_VERSION")),
            tags,
        };
        catalog::save(&self.sidecar_path(image), &sidecar)
            .map_err(|err| FeedError::Tags(err.to_string()))
    }
}

/// Embeds [`ImageTags`] into the image's EXIF block, keeping metadata already present.
///
/// Title goes to `ImageDescription`, author to `Artist`, and comment plus keywords to
/// `UserComment`. An image the EXIF writer rejects gets a sidecar instead.
#[derive(Debug, Clone)]
pub struct ExifTagWriter {
    fallback: SidecarTagWriter,
}

impl ExifTagWriter {
    pub fn new(sidecar_dir: Utf8PathBuf) -> Self {
        Self {
            fallback: SidecarTagWriter::new(sidecar_dir),
        }
    }

    pub fn embed(image: &Utf8Path, tags: &ImageTags) -> Result<(), FeedError> {
        let path = image.as_std_path();
        let mut metadata = Metadata::new_from_path(path).unwrap_or_else(|_| Metadata::new());
        if !tags.title.is_empty() {
            metadata.set_tag(ExifTag::ImageDescription(tags.title.clone()));
        }
        if !tags.author.is_empty() {
            metadata.set_tag(ExifTag::Artist(tags.author.clone()));
        }
        metadata.set_tag(ExifTag::UserComment(user_comment(tags)));
        metadata
            .write_to_file(path)
            .map_err(|err| FeedError::Tags(format!("embed into {image}: {err}")))
    }
}

impl TagWriter for ExifTagWriter {
    fn write_tags(&self, image: &Utf8Path, tags: &ImageTags) -> Result<(), FeedError> {
        match Self::embed(image, tags) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(file = %image, error = %err, "unable to embed tags, writing sidecar");
                self.fallback.write_tags(image, tags)
            }
        }
    }
}

/// EXIF `UserComment` payload: an 8-byte character code followed by the text.
fn user_comment(tags: &ImageTags) -> Vec<u8> {
    let text = if tags.keywords.is_empty() {
        tags.comment.clone()
    } else {
        format!("{}\nKeywords: {}", tags.comment, tags.keywords)
    };
    let mut payload = if text.is_ascii() {
        b"ASCII\0\0\0".to_vec()
    } else {
        vec![0u8; 8]
    };
    payload.extend_from_slice(text.as_bytes());
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copyright_with_parenthesised_author() {
        let (title, author) =
            split_copyright("Lighthouse at dawn, Maine (© Jane Doe/Getty Images)");
        assert_eq!(title, "Lighthouse at dawn, Maine");
        assert_eq!(author, "Jane Doe/Getty Images");
    }

    #[test]
    fn copyright_without_closing_parenthesis() {
        let (title, author) = split_copyright("Dunes © Someone Else ");
        assert_eq!(title, "Dunes");
        assert_eq!(author, "Someone Else");
    }

    #[test]
    fn copyright_without_mark() {
        let (title, author) = split_copyright("Just a caption");
        assert_eq!(title, "Just a caption");
        assert_eq!(author, "");
    }

    #[test]
    fn sidecar_is_named_after_image() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let writer = SidecarTagWriter::new(dir.clone());
        let tags = ImageTags {
            title: "T".to_string(),
            author: "A".to_string(),
            comment: "C".to_string(),
            keywords: "2024-01-01".to_string(),
        };
        writer
            .write_tags(Utf8Path::new("/images/Test.jpg"), &tags)
            .unwrap();

        let content = std::fs::read_to_string(dir.join("Test.jpg.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["title"], "T");
        assert_eq!(value["image"], "Test.jpg");
    }

    #[test]
    fn user_comment_carries_character_code() {
        let tags = ImageTags {
            title: String::new(),
            author: String::new(),
            comment: "Morning".to_string(),
            keywords: "2024-01-01".to_string(),
        };
        let payload = user_comment(&tags);
        assert_eq!(&payload[..8], b"ASCII\0\0\0");
        assert_eq!(&payload[8..], b"Morning\nKeywords: 2024-01-01");

        let tags = ImageTags {
            comment: "Café".to_string(),
            keywords: String::new(),
            ..tags
        };
        let payload = user_comment(&tags);
        assert_eq!(&payload[..8], &[0u8; 8]);
        assert_eq!(&payload[8..], "Café".as_bytes());
    }
}
