//! Part handler types.
//!
//! A leaf part runs a [`HandlerVariant`]: either a native Rust handler or an
//! interpreted procedure built from an argument spec and a body. Both are
//! invoked the same way, with the session and an [`Invocation`] describing
//! the words the part was called with.
//!
//! Handlers receive `&mut EnsembleManager` so they can re-enter dispatch,
//! define further ensembles, or tear parts down. For that reason handlers
//! take `&self`: the same handler may be running more than once on the
//! stack at any moment.
//!
//! # Core Types
//!
//! - [`Invocation`]: the words a part was called with
//! - [`PartHandler`]: trait for native handlers
//! - [`FnHandler`] / [`SimpleFnHandler`]: closure adapters
//! - [`HandlerVariant`]: native or scripted, dispatched by match
//! - [`HostState`]: host objects reachable from handlers, keyed by type

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use crate::error::EnsembleError;
use crate::manager::EnsembleManager;
use crate::script::ScriptProc;

/// The result type for part handlers.
pub type HandlerResult = Result<String, EnsembleError>;

/// The words a part was invoked with.
///
/// For an ordinary call `words[0]` is the part's canonical name, never the
/// abbreviation the caller typed. For the `@error` part the words are
/// `{ensemble path, "@error", original token}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Full command path of the part, e.g. `["info", "args"]`.
    pub path: Vec<String>,
    /// Argument vector as seen by the handler.
    pub words: Vec<String>,
    /// Index of the first parameter word in `words`.
    pub first_param: usize,
}

impl Invocation {
    /// Builds an ordinary invocation: canonical name followed by parameters.
    pub fn new(path: Vec<String>, name: &str, params: &[String]) -> Self {
        let mut words = Vec::with_capacity(params.len() + 1);
        words.push(name.to_string());
        words.extend_from_slice(params);
        Self {
            path,
            words,
            first_param: 1,
        }
    }

    /// The parameters, without the leading name word(s).
    pub fn params(&self) -> &[String] {
        self.words.get(self.first_param..).unwrap_or(&[])
    }

    /// The command path joined by spaces.
    pub fn path_string(&self) -> String {
        self.path.join(" ")
    }
}

/// Trait for native part handlers.
///
/// # Example
///
/// ```rust
/// use ensemble_dispatch::{EnsembleManager, HandlerResult, Invocation, PartHandler};
///
/// struct Echo;
///
/// impl PartHandler for Echo {
///     fn invoke(&self, _m: &mut EnsembleManager, call: &Invocation) -> HandlerResult {
///         Ok(call.params().join(" "))
///     }
/// }
/// ```
pub trait PartHandler {
    /// Runs the handler.
    fn invoke(&self, manager: &mut EnsembleManager, call: &Invocation) -> HandlerResult;
}

/// Trait for values a handler closure may return.
///
/// Lets closures return `anyhow::Result<String>` (or any error convertible
/// into [`EnsembleError`]) as well as [`HandlerResult`] itself.
pub trait IntoHandlerResult {
    /// Convert into a [`HandlerResult`].
    fn into_handler_result(self) -> HandlerResult;
}

impl<E> IntoHandlerResult for Result<String, E>
where
    E: Into<EnsembleError>,
{
    fn into_handler_result(self) -> HandlerResult {
        self.map_err(Into::into)
    }
}

/// Adapter implementing [`PartHandler`] for closures that need the session.
pub struct FnHandler<F, R = HandlerResult> {
    f: F,
    _phantom: std::marker::PhantomData<fn() -> R>,
}

impl<F, R> FnHandler<F, R>
where
    F: Fn(&mut EnsembleManager, &Invocation) -> R,
    R: IntoHandlerResult,
{
    /// Wraps the closure.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<F, R> PartHandler for FnHandler<F, R>
where
    F: Fn(&mut EnsembleManager, &Invocation) -> R,
    R: IntoHandlerResult,
{
    fn invoke(&self, manager: &mut EnsembleManager, call: &Invocation) -> HandlerResult {
        (self.f)(manager, call).into_handler_result()
    }
}

/// Adapter for closures that only look at their parameters.
///
/// ```rust
/// use ensemble_dispatch::{EnsembleManager, Invocation, PartHandler, SimpleFnHandler};
///
/// let handler = SimpleFnHandler::new(|params: &[String]| {
///     Ok::<_, anyhow::Error>(params.len().to_string())
/// });
/// let mut manager = EnsembleManager::new();
/// let call = Invocation::new(vec!["count".into()], "count", &["a".into(), "b".into()]);
/// assert_eq!(handler.invoke(&mut manager, &call).unwrap(), "2");
/// ```
pub struct SimpleFnHandler<F, R = HandlerResult> {
    f: F,
    _phantom: std::marker::PhantomData<fn() -> R>,
}

impl<F, R> SimpleFnHandler<F, R>
where
    F: Fn(&[String]) -> R,
    R: IntoHandlerResult,
{
    /// Wraps the closure.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<F, R> PartHandler for SimpleFnHandler<F, R>
where
    F: Fn(&[String]) -> R,
    R: IntoHandlerResult,
{
    fn invoke(&self, _manager: &mut EnsembleManager, call: &Invocation) -> HandlerResult {
        (self.f)(call.params()).into_handler_result()
    }
}

/// The handler of a leaf part.
pub enum HandlerVariant {
    /// Rust code.
    Native(Box<dyn PartHandler>),
    /// Interpreted procedure (argument spec + body).
    Script(ScriptProc),
}

impl HandlerVariant {
    /// Wraps a native handler.
    pub fn native<H: PartHandler + 'static>(handler: H) -> Self {
        HandlerVariant::Native(Box::new(handler))
    }

    /// Wraps a closure that receives the session and the invocation.
    pub fn from_fn<F, R>(f: F) -> Self
    where
        F: Fn(&mut EnsembleManager, &Invocation) -> R + 'static,
        R: IntoHandlerResult + 'static,
    {
        Self::native(FnHandler::new(f))
    }

    /// Builds an interpreted procedure.
    pub fn script(arg_spec: &str, body: &str) -> Result<Self, EnsembleError> {
        Ok(HandlerVariant::Script(ScriptProc::new(arg_spec, body)?))
    }

    /// Invokes the handler.
    pub fn invoke(&self, manager: &mut EnsembleManager, call: &Invocation) -> HandlerResult {
        match self {
            HandlerVariant::Native(handler) => handler.invoke(manager, call),
            HandlerVariant::Script(proc) => proc.invoke(manager, call),
        }
    }

    /// Usage derived from the handler itself, when it has one.
    pub fn synthesized_usage(&self) -> Option<String> {
        match self {
            HandlerVariant::Native(_) => None,
            HandlerVariant::Script(proc) => Some(proc.usage()),
        }
    }
}

impl fmt::Debug for HandlerVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerVariant::Native(_) => f.write_str("Native(..)"),
            HandlerVariant::Script(proc) => f.debug_tuple("Script").field(proc).finish(),
        }
    }
}

/// Host objects reachable from native handlers, one per type.
///
/// A session keeps the host's own tables here (class records, option
/// stores) so handlers can reach them through the manager they are given.
///
/// ```rust
/// use ensemble_dispatch::{EnsembleError, HostState};
///
/// struct ClassTable { classes: Vec<String> }
///
/// let mut state = HostState::default();
/// state.insert(ClassTable { classes: vec!["Widget".into()] });
/// let table = state.get_required::<ClassTable>()?;
/// assert_eq!(table.classes.len(), 1);
/// # Ok::<(), EnsembleError>(())
/// ```
#[derive(Default)]
pub struct HostState {
    entries: HashMap<TypeId, HostEntry>,
}

struct HostEntry {
    type_name: &'static str,
    value: Box<dyn Any>,
}

impl HostState {
    /// Stores `value`, replacing and returning any earlier value of its type.
    pub fn insert<T: 'static>(&mut self, value: T) -> Option<T> {
        let entry = HostEntry {
            type_name: std::any::type_name::<T>(),
            value: Box::new(value),
        };
        let old = self.entries.insert(TypeId::of::<T>(), entry)?;
        old.value.downcast().ok().map(|b| *b)
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries.get(&TypeId::of::<T>())?.value.downcast_ref()
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.entries.get_mut(&TypeId::of::<T>())?.value.downcast_mut()
    }

    /// Like [`get`](Self::get), failing with a structural error naming `T`.
    pub fn get_required<T: 'static>(&self) -> Result<&T, EnsembleError> {
        self.get::<T>().ok_or_else(|| {
            EnsembleError::structural(format!(
                "host state \"{}\" is not registered",
                std::any::type_name::<T>()
            ))
        })
    }
}

impl fmt::Debug for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.entries.values().map(|e| e.type_name).collect();
        names.sort_unstable();
        f.debug_set().entries(names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(params: &[&str]) -> Invocation {
        let params: Vec<String> = params.iter().map(|s| s.to_string()).collect();
        Invocation::new(vec!["info".into(), "args".into()], "args", &params)
    }

    #[test]
    fn test_invocation_rewrites_name_word() {
        let call = call(&["p1", "p2"]);
        assert_eq!(call.words, vec!["args", "p1", "p2"]);
        assert_eq!(call.params(), ["p1", "p2"]);
        assert_eq!(call.path_string(), "info args");
    }

    #[test]
    fn test_invocation_params_out_of_range() {
        let call = Invocation {
            path: vec![],
            words: vec!["x".into()],
            first_param: 3,
        };
        assert!(call.params().is_empty());
    }

    #[test]
    fn test_fn_handler_sees_manager() {
        let handler = FnHandler::new(|m: &mut EnsembleManager, _call: &Invocation| {
            Ok::<_, anyhow::Error>(m.ensemble_count().to_string())
        });
        let mut manager = EnsembleManager::new();
        manager.create_ensemble("info").unwrap();
        assert_eq!(handler.invoke(&mut manager, &call(&[])).unwrap(), "1");
    }

    #[test]
    fn test_simple_fn_handler_error_is_wrapped() {
        let handler =
            SimpleFnHandler::new(|_p: &[String]| Err::<String, _>(anyhow::anyhow!("nope")));
        let mut manager = EnsembleManager::new();
        let err = handler.invoke(&mut manager, &call(&[])).unwrap_err();
        assert!(matches!(err, EnsembleError::Handler(_)));
        assert_eq!(err.to_string(), "nope");
    }

    #[test]
    fn test_variant_native_has_no_synthesized_usage() {
        let variant = HandlerVariant::from_fn(|_m: &mut EnsembleManager, _c: &Invocation| {
            Ok::<_, EnsembleError>(String::new())
        });
        assert!(variant.synthesized_usage().is_none());
    }

    #[test]
    fn test_variant_script_usage() {
        let variant = HandlerVariant::script("name {level 0} args", "").unwrap();
        assert_eq!(
            variant.synthesized_usage().as_deref(),
            Some("name ?level? ?arg arg ...?")
        );
    }

    #[test]
    fn test_host_state_by_type() {
        struct Counter(u32);
        #[derive(Debug)]
        struct Label(&'static str);

        let mut state = HostState::default();
        assert!(state.insert(Counter(1)).is_none());
        state.get_mut::<Counter>().unwrap().0 += 1;
        assert_eq!(state.get::<Counter>().unwrap().0, 2);
        assert_eq!(state.insert(Counter(7)).unwrap().0, 2);
        assert_eq!(state.get_required::<Counter>().unwrap().0, 7);

        let err = state.get_required::<Label>().unwrap_err();
        assert!(matches!(err, EnsembleError::Structural(_)));
        assert!(err.to_string().contains("Label\" is not registered"));

        state.insert(Label("x"));
        assert_eq!(state.get::<Label>().unwrap().0, "x");
        assert!(format!("{:?}", state).contains("Counter"));
    }
}
