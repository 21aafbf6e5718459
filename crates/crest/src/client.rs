use std::any::Any;
use std::sync::Arc;

use crest_common::http_client::HttpClient;
use crest_common::{ClientError, ConfigError, Destination};

use crate::config::MethodConfig;
use crate::dispatch::ResponseDispatcher;
use crate::entity::HttpEntity;
use crate::executor::RetryExecutor;
use crate::request::{Args, Request};
use crate::response::Response;

/// Invokes configured methods over an [`HttpClient`].
///
/// Cheap to share: it holds the transport and the response dispatcher, while everything
/// method-specific lives in the [`MethodConfig`] passed to each call.
#[derive(Debug, Clone)]
pub struct Crest<C> {
    client: C,
    dispatcher: ResponseDispatcher,
}

impl<C: HttpClient + Sync> Crest<C> {
    /// Over `client` with the default response dispatcher.
    pub fn new(client: C) -> Self {
        Self {
            client,
            dispatcher: ResponseDispatcher::default(),
        }
    }

    /// Replace the default type and mime registries.
    pub fn with_dispatcher(mut self, dispatcher: ResponseDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// The underlying transport.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Call `method` with `args` and decode the result as `T`.
    ///
    /// `T` must be the type the method declares with
    /// [`returns`](crate::config::MethodConfigBuilder::returns).
    pub async fn invoke<T: Any + Send>(
        &self,
        method: &Arc<MethodConfig>,
        args: Args,
    ) -> Result<T, ClientError> {
        let declared = method.return_type();
        if !declared.is::<T>() {
            return Err(mismatch::<T>(declared.name()));
        }
        let response = self.execute(method, args).await?;
        let value = self.dispatcher.dispatch(response)?;
        value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| mismatch::<T>(declared.name()))
    }

    /// Call `method` with `args`, leaving the response undecoded.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn execute(
        &self,
        method: &Arc<MethodConfig>,
        args: Args,
    ) -> Result<Response, ClientError> {
        let request = Arc::new(Request::bind(method, args)?);
        let entity = request.has(Destination::Form).then(|| {
            HttpEntity::new(method.entity_writer().clone(), request.clone()).into_replayable()
        });
        RetryExecutor::new(&self.client)
            .execute(&request, entity.as_ref())
            .await
    }
}

#[cfg(feature = "reqwest-client")]
impl Crest<crest_common::http_client::ReqwestClient> {
    /// Over a pooled reqwest transport honoring per-method timeouts.
    pub fn reqwest() -> Self {
        Self::new(crest_common::http_client::ReqwestClient::new())
    }
}

fn mismatch<T>(declared: &'static str) -> ClientError {
    ConfigError::ReturnTypeMismatch {
        declared,
        expected: std::any::type_name::<T>(),
    }
    .into()
}
