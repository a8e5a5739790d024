//! # RPC Client
//!
//! Encodes a call, hands it to the transport and decodes the response
//! sections.
//!
//! ## Request
//!
//! `C` name `[a<args>]` `[t]` `z`. The name is written without reference
//! tracking; the argument list starts a fresh reference table.
//!
//! ## Response
//!
//! Any sequence of `R<value>`, `A<list>` and `E<string>` sections, then `z`.
//! An `E` section fails the call once the whole response has been read.

use std::sync::Arc;

use parking_lot::RwLock;
use tagpack::ClassRegistry;
use tagpack::Reader;
use tagpack::Tag;
use tagpack::Value;
use tagpack::Writer;
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::error::Result;
use crate::filter::Filter;
use crate::filter::FilterChain;
use crate::mode::ResultMode;
use crate::settings::ClientSettings;
use crate::settings::InvokeSettings;
use crate::transport::Transport;

/// What client filters see for each message.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// The method being called; empty for the function-list query.
    pub method: String,
    pub settings: InvokeSettings,
}

/// Receives the method name and the failure of an asynchronous call.
pub type ErrorHook = Arc<dyn Fn(&str, Error) + Send + Sync>;

/// RPC client for making remote calls over a transport.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    registry: Arc<ClassRegistry>,
    filters: Arc<RwLock<FilterChain<CallContext>>>,
    settings: ClientSettings,
    on_error: Option<ErrorHook>,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_settings(transport, ClientSettings::default())
    }

    pub fn with_settings(transport: Arc<dyn Transport>, settings: ClientSettings) -> Self {
        Self {
            transport,
            registry: Arc::new(ClassRegistry::new()),
            filters: Arc::new(RwLock::new(FilterChain::new())),
            settings,
            on_error: None,
        }
    }

    /// Decodes structured results against `registry` instead of a private one.
    pub fn with_registry(mut self, registry: Arc<ClassRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// The error hook used by asynchronous calls that bring none of their own.
    pub fn with_error_hook(mut self, hook: impl Fn(&str, Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn add_filter(&self, filter: Arc<dyn Filter<CallContext>>) {
        self.filters.write().add(filter);
    }

    pub fn remove_filter(&self, filter: &Arc<dyn Filter<CallContext>>) -> bool {
        self.filters.write().remove(filter)
    }

    /// Replaces every filter with `filter`, or clears the chain.
    pub fn set_filter(&self, filter: Option<Arc<dyn Filter<CallContext>>>) {
        self.filters.write().set(filter);
    }

    /// The first filter, if any.
    pub fn filter(&self) -> Option<Arc<dyn Filter<CallContext>>> {
        self.filters.read().first()
    }

    /// Calls `name` and returns its result.
    ///
    /// With `by_ref`, the arguments the service sends back overwrite `args`
    /// position by position. In the byte-producing modes the result is
    /// `Value::Bytes`: the encoded result (`Serialized`) or the response body
    /// (`Raw`, `RawWithEndTag`).
    pub async fn invoke(&self, name: &str, args: &mut Vec<Value>, settings: InvokeSettings) -> Result<Value> {
        let ctx = CallContext { method: name.to_string(), settings };
        let request = self.encode_call(name, args, &ctx.settings)?;
        let response = self.exchange(request, &ctx).await?;
        self.decode_response(&response, args, ctx.settings.mode)
    }

    /// Runs [`Client::invoke`] on a separate task.
    ///
    /// `callback` receives the result and the (possibly updated) arguments.
    /// On failure `on_error` receives the method name and the error; without
    /// one, the client-wide hook is used, and without that the failure is logged.
    pub fn invoke_with<F>(
        &self,
        name: impl Into<String>,
        mut args: Vec<Value>,
        settings: InvokeSettings,
        callback: F,
        on_error: Option<ErrorHook>,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Value, Vec<Value>) + Send + 'static,
    {
        let client = self.clone();
        let name = name.into();
        let on_error = on_error.or_else(|| self.on_error.clone());
        tokio::spawn(async move {
            match client.invoke(&name, &mut args, settings).await {
                Ok(result) => callback(result, args),
                Err(error) => match on_error {
                    Some(hook) => hook(&name, error),
                    None => tracing::warn!(method = %name, %error, "asynchronous call failed"),
                },
            }
        })
    }

    /// Asks the service for the names of its registered functions.
    pub async fn functions(&self) -> Result<Vec<String>> {
        let ctx = CallContext { method: String::new(), settings: InvokeSettings::default() };
        let response = self.exchange(vec![Tag::End.byte()], &ctx).await?;

        let mut reader = Reader::simple(&response, &self.registry);
        let tag = reader.check_tags(&[Tag::Functions, Tag::Error]).map_err(|_| malformed(&response))?;
        if tag == Tag::Error {
            let message = reader.read_string()?.unwrap_or_default();
            return Err(Error::Remote(message));
        }
        let list = reader.read_list()?.unwrap_or_default();
        let names = list.to_vec().iter().map(Value::as_string).collect::<tagpack::Result<Vec<_>>>()?;
        tracing::trace!(count = names.len(), "received function list");
        Ok(names)
    }

    fn encode_call(&self, name: &str, args: &[Value], settings: &InvokeSettings) -> Result<Vec<u8>> {
        let simple = settings.simple.unwrap_or(self.settings.simple);
        let mut writer = Writer::with_buffer(Vec::new(), simple);
        writer.write_tag(Tag::Call);
        writer.write_string(name);
        if !args.is_empty() || settings.by_ref {
            writer.reset();
            writer.write_values(args)?;
            if settings.by_ref {
                writer.write_bool(true);
            }
        }
        writer.write_tag(Tag::End);
        Ok(writer.into_bytes())
    }

    /// Sends through the filters and the transport, and checks the end marker.
    async fn exchange(&self, request: Vec<u8>, ctx: &CallContext) -> Result<Vec<u8>> {
        let filters = self.filters.read().clone();
        let request = filters.output(request, ctx);
        tracing::trace!(method = %ctx.method, len = request.len(), "sending request");

        let response = self.transport.send_and_receive(&request).await?;
        let response = filters.input(response, ctx);
        tracing::trace!(method = %ctx.method, len = response.len(), "received response");

        if response.last() != Some(&Tag::End.byte()) {
            return Err(malformed(&response));
        }
        Ok(response)
    }

    fn decode_response(&self, data: &[u8], args: &mut [Value], mode: ResultMode) -> Result<Value> {
        match mode {
            ResultMode::RawWithEndTag => return Ok(Value::Bytes(data.to_vec())),
            ResultMode::Raw => return Ok(Value::Bytes(data[..data.len() - 1].to_vec())),
            ResultMode::Normal | ResultMode::Serialized => {}
        }

        let mut reader = Reader::new(data, &self.registry);
        let mut result = Value::Null;
        let mut error = None;
        loop {
            let tag = reader.cursor_mut().read_byte()?;
            match Tag::from_u8(tag) {
                Some(Tag::End) => break,
                Some(Tag::Result) if mode == ResultMode::Serialized => {
                    result = Value::Bytes(reader.read_raw()?.to_vec());
                }
                Some(Tag::Result) => {
                    reader.reset();
                    result = reader.unserialize()?;
                }
                Some(Tag::Argument) => {
                    reader.reset();
                    let returned = reader.read_list()?.unwrap_or_default().to_vec();
                    for (slot, value) in args.iter_mut().zip(returned) {
                        *slot = value;
                    }
                }
                Some(Tag::Error) => {
                    reader.reset();
                    error = Some(reader.read_string()?.unwrap_or_default());
                }
                _ => return Err(malformed(data)),
            }
        }

        match error {
            Some(message) => {
                tracing::debug!(error = %message, "service answered with an error");
                Err(Error::Remote(message))
            }
            None => Ok(result),
        }
    }
}

fn malformed(data: &[u8]) -> Error {
    Error::MalformedResponse(String::from_utf8_lossy(data).into_owned())
}
