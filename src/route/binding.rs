//! Request model binding.
//!
//! A [`Binding`] decodes the JSON body (for methods that carry one) or the
//! query string (for the rest) into a model, validates it, and stores it on
//! the request where handlers read it back with [`Request::bound`].

use crate::errors::RouteError;
use crate::server::Request;
use http::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Model-level validation capability
///
/// Implement this for models that check themselves; use
/// [`Binding::tagged`] for models annotated with `validator` derive tags.
pub trait Validate {
    /// Return a human-readable message when the model is invalid
    fn validate(&self) -> Result<(), String>;
}

type BindFn = dyn Fn(&mut Request) -> Result<Box<dyn Any + Send + Sync>, RouteError> + Send + Sync;

/// Binding descriptor attached to a route
#[derive(Clone)]
pub struct Binding {
    method: Option<Method>,
    model: &'static str,
    bind: Arc<BindFn>,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("method", &self.method)
            .field("model", &self.model)
            .finish()
    }
}

impl Binding {
    /// Bind `T` and run its [`Validate`] implementation
    #[must_use]
    pub fn validate_with<T>() -> Self
    where
        T: DeserializeOwned + Validate + Send + Sync + 'static,
    {
        Self::from_fn::<T>(|model: &T| model.validate())
    }

    /// Bind `T` and run its `validator` derive rules
    #[must_use]
    pub fn tagged<T>() -> Self
    where
        T: DeserializeOwned + validator::Validate + Send + Sync + 'static,
    {
        Self::from_fn::<T>(|model: &T| {
            validator::Validate::validate(model).map_err(|errors| errors.to_string())
        })
    }

    fn from_fn<T>(check: fn(&T) -> Result<(), String>) -> Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        Self {
            method: None,
            model: std::any::type_name::<T>(),
            bind: Arc::new(move |req: &mut Request| {
                let source = source_value(req)?;
                let model: T = serde_json::from_value(source).map_err(|e| {
                    RouteError::ValidationFailed {
                        message: e.to_string(),
                    }
                })?;
                check(&model).map_err(|message| RouteError::ValidationFailed { message })?;
                Ok(Box::new(model) as Box<dyn Any + Send + Sync>)
            }),
        }
    }

    /// Only bind when the request method is `method`
    #[must_use]
    pub fn on(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Type name of the bound model
    #[must_use]
    pub fn model(&self) -> &'static str {
        self.model
    }

    /// Whether this binding runs for `method`
    #[must_use]
    pub fn applies_to(&self, method: &Method) -> bool {
        self.method.as_ref().map_or(true, |m| m == method)
    }

    pub(crate) fn bind(&self, req: &mut Request) -> Result<Box<dyn Any + Send + Sync>, RouteError> {
        (self.bind)(req)
    }
}

fn carries_body(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

fn source_value(req: &mut Request) -> Result<Value, RouteError> {
    if carries_body(req.method()) {
        let bytes = req.body_bytes()?;
        if bytes.is_empty() {
            return Err(RouteError::ValidationFailed {
                message: "request body is empty".to_string(),
            });
        }
        serde_json::from_slice(bytes).map_err(|e| RouteError::ValidationFailed {
            message: e.to_string(),
        })
    } else {
        Ok(Value::Object(req.query_json()))
    }
}
