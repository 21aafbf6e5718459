use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::sync::Arc;

use bytes::Bytes;
use crest::config::MethodConfig;
use crest::crest_common::http_client::HttpClient;
use crest::crest_common::param::META_FILE_NAME;
use crest::{
    Args, BasicAuthorization, ClientError, ConfigError, Crest, Destination, EntityStream,
    ParamConfig, ReturnType,
};
use flate2::Compression;
use flate2::write::GzEncoder;
use http::{Method, StatusCode};
use serde::Deserialize;
use smol_str::SmolStr;
use tokio::sync::Mutex;
use url::Url;

#[derive(Clone, Default)]
struct MockClient {
    queue: Arc<Mutex<VecDeque<http::Response<Vec<u8>>>>>,
    log: Arc<Mutex<Vec<http::Request<Vec<u8>>>>>,
}

impl MockClient {
    async fn push(&self, resp: http::Response<Vec<u8>>) {
        self.queue.lock().await.push_back(resp);
    }

    async fn requests(&self) -> Vec<http::Request<Vec<u8>>> {
        std::mem::take(&mut *self.log.lock().await)
    }
}

impl HttpClient for MockClient {
    type Error = std::convert::Infallible;
    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl core::future::Future<
        Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>,
    > + Send {
        let log = self.log.clone();
        let queue = self.queue.clone();
        async move {
            log.lock().await.push(request);
            Ok(queue.lock().await.pop_front().expect("no queued response"))
        }
    }
}

fn response(
    status: u16,
    content_type: Option<&str>,
    body: impl Into<Vec<u8>>,
) -> http::Response<Vec<u8>> {
    let mut builder = http::Response::builder().status(status);
    if let Some(ct) = content_type {
        builder = builder.header(http::header::CONTENT_TYPE, ct);
    }
    builder.body(body.into()).unwrap()
}

fn endpoint() -> Url {
    Url::parse("https://api.example.com/v1/").unwrap()
}

fn header<'r>(request: &'r http::Request<Vec<u8>>, name: &str) -> Option<&'r str> {
    request.headers().get(name).and_then(|v| v.to_str().ok())
}

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: u64,
    name: String,
}

#[tokio::test]
async fn get_resolves_path_and_query() {
    let client = MockClient::default();
    client
        .push(response(200, Some("application/json"), r#"{"id":42,"name":"ada"}"#))
        .await;

    let get_user = Arc::new(
        MethodConfig::builder(Method::GET, endpoint(), "/users/{id}")
            .accept("application/json")
            .param(ParamConfig::new("id", Destination::Path).build())
            .param(ParamConfig::new("active", Destination::Query).build())
            .returns(ReturnType::serde::<User>())
            .build()
            .unwrap(),
    );

    let crest = Crest::new(client.clone());
    let user: User = crest
        .invoke(&get_user, Args::new().push(42).push(true))
        .await
        .unwrap();
    assert_eq!(
        user,
        User {
            id: 42,
            name: "ada".into()
        }
    );

    let requests = client.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method(), Method::GET);
    assert_eq!(
        requests[0].uri().to_string(),
        "https://api.example.com/v1/users/42?active=true"
    );
    assert_eq!(header(&requests[0], "accept"), Some("application/json"));
    assert!(requests[0].body().is_empty());
}

#[tokio::test]
async fn post_form_joins_list_values() {
    let client = MockClient::default();
    client.push(response(204, None, "")).await;

    let tag = Arc::new(
        MethodConfig::builder(Method::POST, endpoint(), "/tags")
            .param(
                ParamConfig::new("tag", Destination::Form)
                    .list_separator(",")
                    .build(),
            )
            .build()
            .unwrap(),
    );

    let body: Bytes = Crest::new(client.clone())
        .invoke(&tag, Args::new().push_all(["a", "b"]))
        .await
        .unwrap();
    assert!(body.is_empty());

    let requests = client.requests().await;
    assert_eq!(requests[0].body().as_slice(), b"tag=a%2Cb");
    assert_eq!(
        header(&requests[0], "content-type"),
        Some("application/x-www-form-urlencoded; charset=UTF-8")
    );
}

#[tokio::test]
async fn headers_and_cookies() {
    let client = MockClient::default();
    client.push(response(200, None, "ok")).await;

    let method = Arc::new(
        MethodConfig::builder(Method::GET, endpoint(), "/me")
            .extra_param(ParamConfig::new("X-Client", Destination::Header).build(), "crest")
            .param(ParamConfig::new("X-Trace", Destination::Header).build())
            .param(ParamConfig::new("session", Destination::Cookie).build())
            .param(ParamConfig::new("theme", Destination::Cookie).build())
            .build()
            .unwrap(),
    );
    let res = Crest::new(client.clone())
        .execute(&method, Args::new().push_all(["t1", "t2"]).push(1).push("dark"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let requests = client.requests().await;
    let traces: Vec<_> = requests[0]
        .headers()
        .get_all("x-trace")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(traces, ["t1", "t2"]);
    assert_eq!(header(&requests[0], "x-client"), Some("crest"));
    assert_eq!(header(&requests[0], "cookie"), Some("session=1; theme=dark"));
}

#[tokio::test]
async fn basic_authorization_header() {
    let client = MockClient::default();
    client.push(response(200, Some("text/plain"), "hello")).await;

    let method = Arc::new(
        MethodConfig::builder(Method::GET, endpoint(), "/greeting")
            .authorization(Arc::new(BasicAuthorization::new("Aladdin", "open sesame")))
            .returns(ReturnType::of::<String>())
            .build()
            .unwrap(),
    );
    let greeting: String = Crest::new(client.clone())
        .invoke(&method, Args::new())
        .await
        .unwrap();
    assert_eq!(greeting, "hello");

    let requests = client.requests().await;
    assert_eq!(
        header(&requests[0], "authorization"),
        Some("Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==")
    );
}

#[tokio::test]
async fn gzip_response_is_decoded() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(br#"{"id":7,"name":"zip"}"#).unwrap();
    let mut res = response(200, Some("application/json"), encoder.finish().unwrap());
    res.headers_mut().insert(
        http::header::CONTENT_ENCODING,
        http::HeaderValue::from_static("gzip"),
    );

    let client = MockClient::default();
    client.push(res).await;

    let method = Arc::new(
        MethodConfig::builder(Method::GET, endpoint(), "/users/7")
            .returns(ReturnType::serde::<User>())
            .build()
            .unwrap(),
    );
    let user: User = Crest::new(client).invoke(&method, Args::new()).await.unwrap();
    assert_eq!(user.name, "zip");
}

#[tokio::test]
async fn error_status_carries_response() {
    let client = MockClient::default();
    client
        .push(response(404, Some("text/plain"), "no such user"))
        .await;

    let method = Arc::new(
        MethodConfig::builder(Method::GET, endpoint(), "/users/{id}")
            .param(ParamConfig::new("id", Destination::Path).build())
            .build()
            .unwrap(),
    );
    let err = Crest::new(client)
        .invoke::<Bytes>(&method, Args::new().push(9))
        .await
        .unwrap_err();
    match err {
        ClientError::Http(e) => {
            assert_eq!(e.status, StatusCode::NOT_FOUND);
            assert_eq!(e.method, Method::GET);
            assert_eq!(e.url.as_str(), "https://api.example.com/v1/users/9");
            assert_eq!(e.body.as_ref(), b"no such user");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn wrong_return_type_sends_nothing() {
    let client = MockClient::default();
    let method = Arc::new(
        MethodConfig::builder(Method::GET, endpoint(), "/raw")
            .build()
            .unwrap(),
    );
    let err = Crest::new(client.clone())
        .invoke::<String>(&method, Args::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Configuration(ConfigError::ReturnTypeMismatch { .. })
    ));
    assert!(client.requests().await.is_empty());
}

#[tokio::test]
async fn entity_stream_hands_over_body() {
    let client = MockClient::default();
    client
        .push(response(200, Some("application/octet-stream"), vec![1u8, 2, 3]))
        .await;
    let method = Arc::new(
        MethodConfig::builder(Method::GET, endpoint(), "/blob")
            .returns(ReturnType::of::<EntityStream>())
            .build()
            .unwrap(),
    );
    let stream: EntityStream = Crest::new(client).invoke(&method, Args::new()).await.unwrap();
    assert_eq!(stream.into_bytes().as_ref(), &[1, 2, 3]);
}

/// A parsed `multipart/form-data` part.
#[derive(Debug)]
struct Part {
    name: Option<String>,
    file_name: Option<String>,
    content_type: Option<String>,
    body: Bytes,
}

async fn parse_multipart(body: &[u8], boundary: &str) -> Vec<Part> {
    let mut multipart = multer::Multipart::with_reader(body, boundary);
    let mut parts = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().map(str::to_owned);
        let file_name = field.file_name().map(str::to_owned);
        let content_type = field
            .headers()
            .get(http::header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_owned());
        let body = field.bytes().await.unwrap();
        parts.push(Part {
            name,
            file_name,
            content_type,
            body,
        });
    }
    parts
}

#[tokio::test]
async fn multipart_upload_round_trips() {
    let client = MockClient::default();
    client.push(response(201, None, "")).await;

    let upload = Arc::new(
        MethodConfig::builder(Method::POST, endpoint(), "/files")
            .content_type("multipart/form-data")
            .param(ParamConfig::new("title", Destination::Form).build())
            .param(
                ParamConfig::new("data", Destination::Form)
                    .metadata(BTreeMap::from([(
                        SmolStr::new_static(META_FILE_NAME),
                        SmolStr::new_static("report.csv"),
                    )]))
                    .build(),
            )
            .build()
            .unwrap(),
    );
    let payload = Bytes::from_static(b"a,b\r\n1,2\r\n");
    Crest::new(client.clone())
        .execute(&upload, Args::new().push("Q3 numbers").push(payload.clone()))
        .await
        .unwrap();

    let requests = client.requests().await;
    let content_type = header(&requests[0], "content-type").unwrap();
    let boundary = content_type
        .strip_prefix("multipart/form-data; boundary=")
        .unwrap();

    let parts = parse_multipart(requests[0].body(), boundary).await;
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].name.as_deref(), Some("title"));
    assert_eq!(parts[0].file_name, None);
    assert_eq!(
        parts[0].content_type.as_deref(),
        Some("text/plain; charset=UTF-8")
    );
    assert_eq!(parts[0].body.as_ref(), b"Q3 numbers");
    assert_eq!(parts[1].name.as_deref(), Some("data"));
    assert_eq!(parts[1].file_name.as_deref(), Some("report.csv"));
    assert_eq!(parts[1].content_type.as_deref(), Some("text/csv"));
    assert_eq!(parts[1].body, payload);
}
