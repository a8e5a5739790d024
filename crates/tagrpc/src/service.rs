//! # Service Dispatch
//!
//! Turns one request buffer into one response buffer.
//!
//! ## Request loop
//!
//! For every `C` section: read the name, then optionally an argument list and
//! a `t` by-reference marker, resolve the handler (case-insensitively, falling
//! back to the wildcard `*`), run it, and append its `R` (and `A`) sections.
//! A request made only of `z` asks for the function list.
//!
//! ## Failure
//!
//! Nothing escapes [`Service::handle`]. Any failure while parsing or invoking
//! replaces the whole response with a single `E` section.

use std::sync::Arc;

use indexmap::IndexMap;
use tagpack::ClassRegistry;
use tagpack::Reader;
use tagpack::Tag;
use tagpack::Value;
use tagpack::Writer;

use crate::error::Error;
use crate::error::Result;
use crate::filter::Filter;
use crate::filter::FilterChain;
use crate::mode::ResultMode;
use crate::settings::MethodOptions;
use crate::settings::ServiceSettings;

/// Alias of the handler that receives calls to unregistered names.
pub const WILDCARD: &str = "*";

type FunctionHandler<C> = Box<dyn Fn(&mut Vec<Value>, &C) -> anyhow::Result<Value> + Send + Sync>;
type MissingHandler<C> = Box<dyn Fn(&str, &mut Vec<Value>, &C) -> anyhow::Result<Value> + Send + Sync>;
type BeforeHook<C> = Box<dyn Fn(&str, &[Value], bool, &C) -> anyhow::Result<()> + Send + Sync>;
type AfterHook<C> = Box<dyn Fn(&str, &[Value], bool, &Value, &C) -> anyhow::Result<()> + Send + Sync>;
type SendErrorHook<C> = Box<dyn Fn(&Error, &C) + Send + Sync>;

/// A method on a shared receiver, registered with [`Service::add_method`].
pub type Method<T, C> = fn(&T, &mut Vec<Value>, &C) -> anyhow::Result<Value>;

enum Handler<C> {
    Function(FunctionHandler<C>),
    /// The wildcard also receives the name as it was called.
    Missing(MissingHandler<C>),
}

struct Entry<C> {
    /// The name as registered, for the function list.
    alias: String,
    handler: Handler<C>,
    options: MethodOptions,
}

/// A table of callable functions. `C` is the per-request context passed to
/// every handler, hook and filter.
pub struct Service<C = ()> {
    functions: IndexMap<String, Entry<C>>,
    registry: Arc<ClassRegistry>,
    filters: FilterChain<C>,
    settings: ServiceSettings,
    before_invoke: Option<BeforeHook<C>>,
    after_invoke: Option<AfterHook<C>>,
    send_error: Option<SendErrorHook<C>>,
}

impl<C> Default for Service<C> {
    fn default() -> Self {
        Self::with_settings(ServiceSettings::default())
    }
}

impl<C> Service<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: ServiceSettings) -> Self {
        Self {
            functions: IndexMap::new(),
            registry: Arc::new(ClassRegistry::new()),
            filters: FilterChain::new(),
            settings,
            before_invoke: None,
            after_invoke: None,
            send_error: None,
        }
    }

    /// Decodes structured arguments against `registry` instead of a private one.
    pub fn with_registry(mut self, registry: Arc<ClassRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ServiceSettings {
        &mut self.settings
    }

    // ------------------------------------------------------------------------
    //  Registration
    // ------------------------------------------------------------------------

    fn insert(&mut self, alias: &str, handler: Handler<C>, options: MethodOptions) {
        let entry = Entry { alias: alias.to_string(), handler, options };
        // same position on replace, so the function list keeps registration order
        self.functions.insert(alias.to_lowercase(), entry);
    }

    pub fn add_function<F>(&mut self, alias: &str, function: F)
    where
        F: Fn(&mut Vec<Value>, &C) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.add_function_with(alias, function, MethodOptions::default());
    }

    /// Registers `function` under `alias`, replacing any earlier binding of the same name.
    pub fn add_function_with<F>(&mut self, alias: &str, function: F, options: MethodOptions)
    where
        F: Fn(&mut Vec<Value>, &C) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.insert(alias, Handler::Function(Box::new(function)), options);
    }

    /// Registers `method` bound to `receiver`.
    pub fn add_method<T>(&mut self, alias: &str, receiver: Arc<T>, method: Method<T, C>, options: MethodOptions)
    where
        T: Send + Sync + 'static,
        C: 'static,
    {
        let function = move |args: &mut Vec<Value>, ctx: &C| method(&receiver, args, ctx);
        self.insert(alias, Handler::Function(Box::new(function)), options);
    }

    /// Registers several methods of one receiver. With a prefix, each alias
    /// becomes `prefix_name`.
    pub fn add_methods<T>(
        &mut self,
        receiver: Arc<T>,
        methods: &[(&str, Method<T, C>)],
        prefix: Option<&str>,
        options: MethodOptions,
    ) where
        T: Send + Sync + 'static,
        C: 'static,
    {
        for (name, method) in methods {
            let alias = match prefix {
                Some(prefix) => format!("{}_{}", prefix, name),
                None => name.to_string(),
            };
            self.add_method(&alias, receiver.clone(), *method, options.clone());
        }
    }

    /// Registers the wildcard handler, called for every name nothing else matches.
    pub fn add_missing_function<F>(&mut self, function: F, options: MethodOptions)
    where
        F: Fn(&str, &mut Vec<Value>, &C) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.insert(WILDCARD, Handler::Missing(Box::new(function)), options);
    }

    /// Registered aliases in registration order, as registered.
    pub fn function_names(&self) -> Vec<String> {
        self.functions.values().map(|entry| entry.alias.clone()).collect()
    }

    // ------------------------------------------------------------------------
    //  Hooks and filters
    // ------------------------------------------------------------------------

    /// Runs before every handler. An error aborts the request.
    pub fn on_before_invoke(&mut self, hook: impl Fn(&str, &[Value], bool, &C) -> anyhow::Result<()> + Send + Sync + 'static) {
        self.before_invoke = Some(Box::new(hook));
    }

    /// Runs after every handler with its result. An error aborts the request.
    pub fn on_after_invoke(
        &mut self,
        hook: impl Fn(&str, &[Value], bool, &Value, &C) -> anyhow::Result<()> + Send + Sync + 'static,
    ) {
        self.after_invoke = Some(Box::new(hook));
    }

    /// Runs before an error response is sent.
    pub fn on_send_error(&mut self, hook: impl Fn(&Error, &C) + Send + Sync + 'static) {
        self.send_error = Some(Box::new(hook));
    }

    pub fn add_filter(&mut self, filter: Arc<dyn Filter<C>>) {
        self.filters.add(filter);
    }

    pub fn remove_filter(&mut self, filter: &Arc<dyn Filter<C>>) -> bool {
        self.filters.remove(filter)
    }

    pub fn set_filter(&mut self, filter: Option<Arc<dyn Filter<C>>>) {
        self.filters.set(filter);
    }

    pub fn filter(&self) -> Option<Arc<dyn Filter<C>>> {
        self.filters.first()
    }

    // ------------------------------------------------------------------------
    //  Dispatch
    // ------------------------------------------------------------------------

    /// Answers one request. Always returns a complete response.
    pub fn handle(&self, data: &[u8], ctx: &C) -> Vec<u8> {
        match self.dispatch(data, ctx) {
            Ok(response) => self.filters.output(response, ctx),
            Err(error) => self.error_response(error, ctx),
        }
    }

    fn dispatch(&self, data: &[u8], ctx: &C) -> Result<Vec<u8>> {
        let data = self.filters.input(data.to_vec(), ctx);
        if data.last() != Some(&Tag::End.byte()) {
            return Err(Error::MalformedRequest(String::from_utf8_lossy(&data).into_owned()));
        }

        let mut reader = Reader::simple(&data, &self.registry);
        match reader.check_tags(&[Tag::Call, Tag::End]) {
            Ok(Tag::Call) => self.invoke_calls(&mut reader, ctx),
            Ok(_) => self.function_list(),
            Err(_) => Err(Error::MalformedRequest(String::from_utf8_lossy(&data).into_owned())),
        }
    }

    fn invoke_calls(&self, reader: &mut Reader<'_>, ctx: &C) -> Result<Vec<u8>> {
        let mut response = Vec::new();
        loop {
            let name = reader
                .read_string()?
                .ok_or_else(|| Error::MalformedRequest("missing method name".into()))?;
            let mut args = Vec::new();
            let mut by_ref = false;

            let mut tag = reader.check_tags(&[Tag::List, Tag::End, Tag::Call])?;
            if tag == Tag::List {
                // arguments carry their own reference table
                let mut args_reader = Reader::with_cursor(reader.cursor().clone(), reader.registry(), false);
                args = args_reader.read_list_without_tag()?.to_vec();
                tag = args_reader.check_tags(&[Tag::True, Tag::End, Tag::Call])?;
                if tag == Tag::True {
                    by_ref = true;
                    tag = args_reader.check_tags(&[Tag::End, Tag::Call])?;
                }
                *reader.cursor_mut() = args_reader.into_cursor();
            }

            if let Some(hook) = &self.before_invoke {
                hook(&name, &args, by_ref, ctx)?;
            }

            let entry = self
                .functions
                .get(&name.to_lowercase())
                .or_else(|| self.functions.get(WILDCARD))
                .ok_or_else(|| Error::UnknownMethod(name.clone()))?;
            let mode = entry.options.mode;
            tracing::debug!(method = %name, by_ref, ?mode, "invoking");

            let result = match &entry.handler {
                Handler::Function(function) => function(&mut args, ctx)?,
                Handler::Missing(function) => function(&name, &mut args, ctx)?,
            };

            if let Some(hook) = &self.after_invoke {
                hook(&name, &args, by_ref, &result, ctx)?;
            }

            match mode {
                ResultMode::Normal => {
                    response.push(Tag::Result.byte());
                    let simple = entry.options.simple.unwrap_or(self.settings.simple);
                    let mut writer = Writer::with_buffer(response, simple);
                    writer.serialize(&result)?;
                    if by_ref {
                        writer.write_tag(Tag::Argument);
                        writer.reset();
                        writer.write_values(&args)?;
                    }
                    response = writer.into_bytes();
                }
                ResultMode::Serialized => {
                    response.push(Tag::Result.byte());
                    response.extend_from_slice(&output_bytes(&name, mode, &result)?);
                }
                ResultMode::Raw => {
                    response.extend_from_slice(&output_bytes(&name, mode, &result)?);
                    response.push(Tag::End.byte());
                    return Ok(response);
                }
                ResultMode::RawWithEndTag => {
                    response.extend_from_slice(&output_bytes(&name, mode, &result)?);
                    return Ok(response);
                }
            }

            if tag != Tag::Call {
                break;
            }
        }
        response.push(Tag::End.byte());
        Ok(response)
    }

    fn function_list(&self) -> Result<Vec<u8>> {
        let names: Vec<Value> = self.functions.values().map(|entry| Value::from(entry.alias.as_str())).collect();
        tracing::trace!(count = names.len(), "sending function list");

        let mut writer = Writer::simple();
        writer.write_tag(Tag::Functions);
        writer.write_values(&names)?;
        writer.write_tag(Tag::End);
        Ok(writer.into_bytes())
    }

    fn error_response(&self, error: Error, ctx: &C) -> Vec<u8> {
        if let Some(hook) = &self.send_error {
            hook(&error, ctx);
        }
        let message = match &error {
            Error::Handler(cause) if self.settings.debug => format!("{:?}", cause),
            _ => error.to_string(),
        };
        tracing::warn!(%error, "answering with an error response");

        let mut writer = Writer::simple();
        writer.write_tag(Tag::Error);
        writer.write_string(&message);
        writer.write_tag(Tag::End);
        self.filters.output(writer.into_bytes(), ctx)
    }
}

/// The bytes a handler in a byte-producing mode returned.
fn output_bytes(method: &str, mode: ResultMode, result: &Value) -> Result<Vec<u8>> {
    match result {
        Value::Bytes(bytes) => Ok(bytes.clone()),
        Value::Empty => Ok(Vec::new()),
        _ => Err(Error::InvalidOutput { method: method.to_string(), mode }),
    }
}
