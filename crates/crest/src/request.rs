use std::sync::Arc;

use crest_common::param::{Destination, Param, ParamValue};
use crest_common::{ArgumentError, Charset};

use crate::config::MethodConfig;

/// Positional invocation arguments, one slot per declared parameter.
///
/// A slot holds zero or more values: none to fall back to the parameter's default, many
/// for list-valued parameters.
#[derive(Debug, Clone, Default)]
pub struct Args(Vec<Vec<ParamValue>>);

impl Args {
    /// No arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// One value.
    pub fn push(mut self, value: impl Into<ParamValue>) -> Self {
        self.0.push(vec![value.into()]);
        self
    }

    /// A list of values for one parameter.
    pub fn push_all<I>(mut self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ParamValue>,
    {
        self.0.push(values.into_iter().map(Into::into).collect());
        self
    }

    /// No value; the parameter's default applies.
    pub fn push_none(mut self) -> Self {
        self.0.push(Vec::new());
        self
    }

    /// Number of argument slots.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no arguments were pushed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ParamValue> for Args {
    fn from_iter<T: IntoIterator<Item = ParamValue>>(iter: T) -> Self {
        Self(iter.into_iter().map(|v| vec![v]).collect())
    }
}

/// One invocation: the method config plus its bound parameters, grouped by destination.
///
/// Immutable once bound. Encoder, entity writer, channel and dispatcher share it through
/// an `Arc`.
#[derive(Debug)]
pub struct Request {
    config: Arc<MethodConfig>,
    params: [Vec<Param>; 6],
}

impl Request {
    /// Bind `args` to the declared parameters of `config`.
    ///
    /// Static parameters of the config come first in every destination, followed by the
    /// invocation's parameters in declaration order.
    pub fn bind(config: &Arc<MethodConfig>, args: Args) -> Result<Self, ArgumentError> {
        let declared = config.params();
        if declared.len() != args.len() {
            return Err(ArgumentError::ArityMismatch {
                expected: declared.len(),
                actual: args.len(),
            });
        }

        let mut params: [Vec<Param>; 6] = Default::default();
        for param in config.extra_params() {
            params[param.destination() as usize].push(param.clone());
        }
        for (param_config, values) in declared.iter().zip(args.0) {
            if let Some(param) = Param::bind(param_config.clone(), values) {
                params[param.destination() as usize].push(param);
            }
        }

        Ok(Self {
            config: config.clone(),
            params,
        })
    }

    /// The method this request invokes.
    pub fn config(&self) -> &Arc<MethodConfig> {
        &self.config
    }

    /// Bound parameters for `destination`, in order.
    pub fn params(&self, destination: Destination) -> &[Param] {
        &self.params[destination as usize]
    }

    /// Whether any parameter is bound for `destination`.
    pub fn has(&self, destination: Destination) -> bool {
        !self.params(destination).is_empty()
    }

    /// Request charset.
    pub fn charset(&self) -> Charset {
        self.config.charset()
    }
}
