use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use crest_common::param::{Destination, META_CONTENT_TYPE, META_FILE_NAME, Param, ParamValue};
use crest_common::EncodeError;
use rand::Rng;
use rand::distributions::Alphanumeric;

use super::EntityWriter;
use crate::request::Request;

const OCTET_STREAM: &str = "application/octet-stream";

/// `multipart/form-data` bodies.
///
/// Binary values (bytes, files) and parameters whose `part` metadata is `file` become
/// file parts; everything else becomes a text part. Files are streamed at write time, and
/// the content length comes from file metadata without reading them. All file access is
/// blocking; channels run the writer on the blocking pool.
#[derive(Debug, Clone)]
pub struct MultipartEntityWriter {
    boundary: String,
}

enum Body {
    Bytes(Bytes),
    File(PathBuf),
}

struct Part {
    head: String,
    body: Body,
}

impl MultipartEntityWriter {
    /// Media type, without parameters.
    pub const MEDIA_TYPE: &'static str = "multipart/form-data";

    /// Writer with a fresh random boundary.
    pub fn new() -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(30)
            .map(char::from)
            .collect();
        Self::with_boundary(format!("----crest{token}"))
    }

    /// Writer with a fixed boundary.
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
        }
    }

    /// Part boundary.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    fn parts(&self, request: &Request) -> Result<Vec<Part>, EncodeError> {
        let charset = request.charset();
        let mut parts = Vec::new();
        for param in request.params(Destination::Form) {
            for value in param.values() {
                parts.push(self.part(param, value, charset)?);
            }
        }
        Ok(parts)
    }

    fn part(
        &self,
        param: &Param,
        value: &ParamValue,
        charset: crest_common::Charset,
    ) -> Result<Part, EncodeError> {
        let config = param.config();
        let name = quote(param.name());
        let explicit_type = config.meta(META_CONTENT_TYPE);

        if !(value.is_binary() || config.is_file_part()) {
            let text = config.serialize(value, charset)?;
            let content_type = explicit_type
                .map(str::to_string)
                .unwrap_or_else(|| format!("text/plain; charset={charset}"));
            return Ok(Part {
                head: self.head(
                    &format!("form-data; name=\"{name}\""),
                    &content_type,
                ),
                body: Body::Bytes(Bytes::from(charset.encode(&text)?.into_owned())),
            });
        }

        let (file_name, body) = match value {
            ParamValue::File(path) => {
                let file_name = config.meta(META_FILE_NAME).map(str::to_string).unwrap_or_else(|| {
                    path.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| param.name().to_string())
                });
                (file_name, Body::File(path.clone()))
            }
            ParamValue::Bytes(bytes) => (
                config
                    .meta(META_FILE_NAME)
                    .unwrap_or(param.name())
                    .to_string(),
                Body::Bytes(bytes.clone()),
            ),
            other => {
                let text = config.serialize(other, charset)?;
                (
                    config
                        .meta(META_FILE_NAME)
                        .unwrap_or(param.name())
                        .to_string(),
                    Body::Bytes(Bytes::from(charset.encode(&text)?.into_owned())),
                )
            }
        };
        let content_type = explicit_type.unwrap_or_else(|| guess_content_type(Path::new(&file_name)));
        Ok(Part {
            head: self.head(
                &format!(
                    "form-data; name=\"{name}\"; filename=\"{}\"",
                    quote(&file_name)
                ),
                content_type,
            ),
            body,
        })
    }

    fn head(&self, disposition: &str, content_type: &str) -> String {
        format!(
            "--{}\r\nContent-Disposition: {disposition}\r\nContent-Type: {content_type}\r\n\r\n",
            self.boundary
        )
    }

    fn closing(&self) -> String {
        format!("--{}--\r\n", self.boundary)
    }
}

impl Default for MultipartEntityWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityWriter for MultipartEntityWriter {
    fn content_type(&self, _request: &Request) -> String {
        format!("{}; boundary={}", Self::MEDIA_TYPE, self.boundary)
    }

    fn content_length(&self, request: &Request) -> Result<Option<u64>, EncodeError> {
        let mut length = self.closing().len() as u64;
        for part in self.parts(request)? {
            length += part.head.len() as u64 + 2;
            length += match &part.body {
                Body::Bytes(bytes) => bytes.len() as u64,
                Body::File(path) => std::fs::metadata(path)?.len(),
            };
        }
        Ok(Some(length))
    }

    fn write_to(&self, request: &Request, out: &mut dyn Write) -> Result<(), EncodeError> {
        for part in self.parts(request)? {
            out.write_all(part.head.as_bytes())?;
            match part.body {
                Body::Bytes(bytes) => out.write_all(&bytes)?,
                Body::File(path) => {
                    std::io::copy(&mut File::open(path)?, out)?;
                }
            }
            out.write_all(b"\r\n")?;
        }
        out.write_all(self.closing().as_bytes())?;
        Ok(())
    }
}

/// Quotes and line breaks cannot appear inside a quoted disposition parameter.
fn quote(s: &str) -> String {
    s.replace('"', "%22").replace('\r', "%0D").replace('\n', "%0A")
}

fn guess_content_type(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return OCTET_STREAM;
    };
    match ext.to_ascii_lowercase().as_str() {
        "txt" | "text" | "log" => "text/plain",
        "htm" | "html" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        _ => OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use crest_common::param::{META_PART, PART_FILE, ParamConfig};
    use http::Method;
    use smol_str::SmolStr;
    use url::Url;

    use super::*;
    use crate::config::MethodConfig;
    use crate::request::Args;

    #[test]
    fn guesses_by_extension() {
        assert_eq!(guess_content_type(Path::new("a.PNG")), "image/png");
        assert_eq!(guess_content_type(Path::new("notes")), OCTET_STREAM);
        assert_eq!(guess_content_type(Path::new("x.unknown")), OCTET_STREAM);
    }

    #[test]
    fn boundaries_differ_per_writer() {
        assert_ne!(
            MultipartEntityWriter::new().boundary(),
            MultipartEntityWriter::new().boundary()
        );
    }

    #[test]
    fn length_matches_written_bytes() {
        let path = std::env::temp_dir().join("crest-multipart-length.json");
        std::fs::write(&path, br#"{"k":1}"#).unwrap();

        let config = Arc::new(
            MethodConfig::builder(
                Method::POST,
                Url::parse("https://example.com").unwrap(),
                "/upload",
            )
            .content_type("multipart/form-data")
            .param(ParamConfig::new("title", Destination::Form).build())
            .param(ParamConfig::new("doc", Destination::Form).build())
            .param(
                ParamConfig::new("note", Destination::Form)
                    .metadata(BTreeMap::from([(
                        SmolStr::new_static(META_PART),
                        SmolStr::new_static(PART_FILE),
                    )]))
                    .build(),
            )
            .build()
            .unwrap(),
        );
        let request = Request::bind(
            &config,
            Args::new()
                .push("héllo")
                .push(path.clone())
                .push("as file"),
        )
        .unwrap();

        let writer = MultipartEntityWriter::with_boundary("XyZ");
        let mut body = Vec::new();
        writer.write_to(&request, &mut body).unwrap();
        let length = writer.content_length(&request).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(length, Some(body.len() as u64));
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains(
            "Content-Disposition: form-data; name=\"doc\"; filename=\"crest-multipart-length.json\"\r\nContent-Type: application/json\r\n\r\n{\"k\":1}\r\n"
        ));
        assert!(text.contains(
            "name=\"note\"; filename=\"note\"\r\nContent-Type: application/octet-stream\r\n\r\nas file\r\n"
        ));
        assert!(text.ends_with("--XyZ--\r\n"));
    }
}
