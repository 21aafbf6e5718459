use std::io::Write;

use crest_common::encode::{encode_params, to_query_string};
use crest_common::param::Destination;
use crest_common::EncodeError;

use super::EntityWriter;
use crate::request::Request;

/// `application/x-www-form-urlencoded` bodies, encoded exactly like a query string.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlEncodedEntityWriter;

impl UrlEncodedEntityWriter {
    /// Media type, without parameters.
    pub const MEDIA_TYPE: &'static str = "application/x-www-form-urlencoded";

    fn render(&self, request: &Request) -> Result<String, EncodeError> {
        let pairs = encode_params(request.params(Destination::Form), request.charset())?;
        to_query_string(&pairs, request.charset())
    }
}

impl EntityWriter for UrlEncodedEntityWriter {
    fn content_type(&self, request: &Request) -> String {
        format!("{}; charset={}", Self::MEDIA_TYPE, request.charset())
    }

    fn content_length(&self, request: &Request) -> Result<Option<u64>, EncodeError> {
        Ok(Some(self.render(request)?.len() as u64))
    }

    fn write_to(&self, request: &Request, out: &mut dyn Write) -> Result<(), EncodeError> {
        out.write_all(self.render(request)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crest_common::param::ParamConfig;
    use http::Method;
    use url::Url;

    use super::*;
    use crate::config::MethodConfig;
    use crate::request::Args;

    #[test]
    fn joins_list_values_with_separator() {
        let config = Arc::new(
            MethodConfig::builder(
                Method::POST,
                Url::parse("https://example.com").unwrap(),
                "/tags",
            )
            .param(
                ParamConfig::new("tag", Destination::Form)
                    .list_separator(",")
                    .build(),
            )
            .param(ParamConfig::new("note", Destination::Form).build())
            .build()
            .unwrap(),
        );
        let request =
            Request::bind(&config, Args::new().push_all(["a", "b"]).push("x y")).unwrap();
        let writer = UrlEncodedEntityWriter;

        let mut body = Vec::new();
        writer.write_to(&request, &mut body).unwrap();
        assert_eq!(body, b"tag=a%2Cb&note=x%20y");
        assert_eq!(
            writer.content_length(&request).unwrap(),
            Some(body.len() as u64)
        );
        assert_eq!(
            writer.content_type(&request),
            "application/x-www-form-urlencoded; charset=UTF-8"
        );
    }
}
