//! BoxGenerator -- object-safe dynamic dispatch wrapper for Generator.
//!
//! 1. Define an object-safe `GeneratorDyn` trait with boxed futures
//! 2. Blanket-impl `GeneratorDyn` for all `T: Generator`
//! 3. `BoxGenerator` wraps `Box<dyn GeneratorDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use campflow_types::error::CallError;
use serde_json::Value;

use super::generator::{GenerationRequest, Generator};

/// Object-safe version of [`Generator`] with boxed futures.
pub trait GeneratorDyn: Send + Sync {
    fn name(&self) -> &str;

    fn generate_boxed<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Value, CallError>> + Send + 'a>>;
}

/// Blanket implementation: any `Generator` automatically implements `GeneratorDyn`.
impl<T: Generator> GeneratorDyn for T {
    fn name(&self) -> &str {
        Generator::name(self)
    }

    fn generate_boxed<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Value, CallError>> + Send + 'a>> {
        Box::pin(self.generate(request))
    }
}

/// Type-erased generator selected at startup.
pub struct BoxGenerator {
    inner: Box<dyn GeneratorDyn + Send + Sync>,
}

impl BoxGenerator {
    pub fn new<T: Generator + 'static>(generator: T) -> Self {
        Self {
            inner: Box::new(generator),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<Value, CallError> {
        self.inner.generate_boxed(request).await
    }
}
