//! The compiled-watch contract.
//!
//! Parsing expression text is not the engine's business. An external
//! compiler turns text into a [`CompiledExpression`]; the engine only
//! evaluates it against a [`ScopeView`]. The forms defined here are the
//! building blocks the engine needs itself: key paths, constants and
//! literal arrays.

use std::rc::Rc;

use scopewatch_value::{KeyPath, ScopeId, Value};

use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// Read-only view of a scope, handed to getters and expressions.
#[derive(Clone, Copy)]
pub struct ScopeView<'a> {
    engine: &'a Engine,
    scope: ScopeId,
}

impl<'a> ScopeView<'a> {
    pub(crate) fn new(engine: &'a Engine, scope: ScopeId) -> Self {
        Self { engine, scope }
    }

    pub fn id(&self) -> ScopeId {
        self.scope
    }

    /// Read a key with inheritance fall-through.
    pub fn get(&self, key: &str) -> Value {
        self.engine.get(self.scope, key)
    }

    /// Read a key path with inheritance fall-through.
    pub fn lookup(&self, path: &KeyPath) -> Value {
        self.engine.get_path(self.scope, path)
    }

    pub fn engine(&self) -> &'a Engine {
        self.engine
    }
}

/// A compiled watch expression.
pub trait CompiledExpression {
    /// Evaluate against a scope. Must be free of required side effects and
    /// safe to call any number of times.
    fn evaluate(&self, view: &ScopeView<'_>) -> Value;

    /// Write through the expression.
    fn assign(&self, _engine: &mut Engine, _scope: ScopeId, _value: Value) -> Result<()> {
        Err(EngineError::Assign {
            expression: self.source(),
        })
    }

    /// Literal expressions are only re-evaluated when one of their
    /// [`direct_inputs`](CompiledExpression::direct_inputs) changes.
    fn is_literal(&self) -> bool {
        false
    }

    /// Constant expressions are evaluated once at registration and never
    /// watched.
    fn is_constant(&self) -> bool {
        false
    }

    fn direct_inputs(&self) -> Vec<Rc<dyn CompiledExpression>> {
        Vec::new()
    }

    /// Text form, for diagnostics.
    fn source(&self) -> String;
}

/// Turns expression text into a compiled expression.
pub trait ExpressionCompiler {
    fn compile(&self, text: &str) -> Result<Rc<dyn CompiledExpression>>;
}

/// Reads a key path through the scope.
#[derive(Debug, Clone)]
pub struct KeyPathExpression {
    path: KeyPath,
}

impl KeyPathExpression {
    pub fn new(path: KeyPath) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &KeyPath {
        &self.path
    }
}

impl CompiledExpression for KeyPathExpression {
    fn evaluate(&self, view: &ScopeView<'_>) -> Value {
        view.lookup(&self.path)
    }

    /// A single key is written on the scope itself. A longer path writes
    /// into the map or scope its prefix resolves to.
    fn assign(&self, engine: &mut Engine, scope: ScopeId, value: Value) -> Result<()> {
        if !engine.contains(scope) {
            return Err(EngineError::ScopeUnavailable(scope));
        }
        let components: Vec<&String> = self.path.iter().collect();
        let Some((last, prefix)) = components.split_last() else {
            return Err(EngineError::Assign {
                expression: self.source(),
            });
        };
        if prefix.is_empty() {
            engine.set(scope, last, value);
            return Ok(());
        }

        let mut target = engine.get(scope, prefix[0]);
        for component in &prefix[1..] {
            target = match &target {
                Value::Scope(id) => engine.get(*id, component),
                other => other.get_key(component),
            };
        }
        match target {
            Value::Map(map) => {
                map.borrow_mut().insert(last.to_string(), value);
                engine.schedule(scope);
                Ok(())
            }
            Value::Scope(id) if engine.contains(id) => {
                engine.set(id, last, value);
                Ok(())
            }
            _ => Err(EngineError::Assign {
                expression: self.source(),
            }),
        }
    }

    fn source(&self) -> String {
        self.path.to_string()
    }
}

/// A fixed value.
#[derive(Debug, Clone)]
pub struct ConstantExpression {
    value: Value,
}

impl ConstantExpression {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl CompiledExpression for ConstantExpression {
    fn evaluate(&self, _view: &ScopeView<'_>) -> Value {
        self.value.clone()
    }

    fn is_constant(&self) -> bool {
        true
    }

    fn source(&self) -> String {
        self.value.to_json().to_string()
    }
}

/// An array literal over other expressions, e.g. `[a, b.c]`.
///
/// Every evaluation builds a fresh array, so it would never compare equal
/// to its previous result; as a literal it is instead compared element by
/// element through its inputs.
#[derive(Clone)]
pub struct ArrayLiteralExpression {
    items: Vec<Rc<dyn CompiledExpression>>,
}

impl ArrayLiteralExpression {
    pub fn new(items: Vec<Rc<dyn CompiledExpression>>) -> Self {
        Self { items }
    }
}

impl CompiledExpression for ArrayLiteralExpression {
    fn evaluate(&self, view: &ScopeView<'_>) -> Value {
        Value::array(self.items.iter().map(|item| item.evaluate(view)).collect())
    }

    fn is_literal(&self) -> bool {
        true
    }

    fn is_constant(&self) -> bool {
        self.items.iter().all(|item| item.is_constant())
    }

    fn direct_inputs(&self) -> Vec<Rc<dyn CompiledExpression>> {
        self.items.clone()
    }

    fn source(&self) -> String {
        let items: Vec<String> = self.items.iter().map(|item| item.source()).collect();
        format!("[{}]", items.join(", "))
    }
}

/// Default compiler: accepts dotted key paths only.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyPathCompiler;

impl ExpressionCompiler for KeyPathCompiler {
    fn compile(&self, text: &str) -> Result<Rc<dyn CompiledExpression>> {
        let path = KeyPath::parse(text).map_err(|source| EngineError::Compile {
            expression: text.to_string(),
            source,
        })?;
        Ok(Rc::new(KeyPathExpression::new(path)))
    }
}
