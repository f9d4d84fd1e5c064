use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::error::{LoxError, Result};
use crate::token::Token;
use crate::value::Value;

/// Shared handle to a scope.  Closures, bound methods and the interpreter's
/// current‑scope pointer all hold one, so a scope lives as long as anything
/// can still reach it and mutations are visible through every handle.
pub type EnvRef = Rc<RefCell<Environment>>;

/// One lexical scope: its bindings plus a link to the enclosing scope.
/// Only the global environment has no parent.
#[derive(Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<EnvRef>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn with_enclosing(enclosing: EnvRef) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Wrap into a shared handle.
    pub fn into_ref(self) -> EnvRef {
        Rc::new(RefCell::new(self))
    }

    pub(crate) fn enclosing(&self) -> Option<&EnvRef> {
        self.enclosing.as_ref()
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.values()
    }

    /// Empties the scope, handing the old bindings to the caller so they
    /// are dropped outside any borrow of this scope.
    pub(crate) fn take_values(&mut self) -> HashMap<String, Value> {
        std::mem::take(&mut self.values)
    }

    /// Bind `name` in this scope, replacing any previous binding.
    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    /// Dynamic lookup walking outward.  Used for globals, where no distance
    /// was resolved.
    pub fn get(&self, name: &Token) -> Result<Value> {
        if let Some(value) = self.values.get(&name.lexeme) {
            Ok(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name)
        } else {
            Err(undefined(name))
        }
    }

    /// Assign to an existing binding; never declares.
    pub fn assign(&mut self, name: &Token, value: Value) -> Result<()> {
        if let Some(slot) = self.values.get_mut(&name.lexeme) {
            *slot = value;
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            Err(undefined(name))
        }
    }

    /// The scope `distance` hops out from `env`.
    pub fn ancestor(env: &EnvRef, distance: usize) -> Option<EnvRef> {
        let mut current = Rc::clone(env);

        for _ in 0..distance {
            let next = current.borrow().enclosing.clone()?;
            current = next;
        }

        Some(current)
    }

    /// Read `name` from exactly the scope `distance` hops out.
    pub fn get_at(env: &EnvRef, distance: usize, name: &str, line: usize) -> Result<Value> {
        debug!("get_at '{}' distance {}", name, distance);

        Self::ancestor(env, distance)
            .and_then(|scope| scope.borrow().values.get(name).cloned())
            .ok_or_else(|| LoxError::runtime(line, format!("Undefined variable '{}'.", name)))
    }

    /// Assign `name` in exactly the scope `distance` hops out.
    pub fn assign_at(env: &EnvRef, distance: usize, name: &Token, value: Value) -> Result<()> {
        debug!("assign_at '{}' distance {}", name.lexeme, distance);

        let scope = Self::ancestor(env, distance).ok_or_else(|| undefined(name))?;
        let mut scope = scope.borrow_mut();

        match scope.values.get_mut(&name.lexeme) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(undefined(name)),
        }
    }
}

fn undefined(name: &Token) -> LoxError {
    LoxError::runtime(name.line, format!("Undefined variable '{}'.", name.lexeme))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn ident(name: &str) -> Token {
        Token::new(TokenType::IDENTIFIER, name, None, 1)
    }

    #[test]
    fn assignment_through_shared_parent_is_visible_to_all_children() {
        let global = Environment::new().into_ref();
        global.borrow_mut().define("x", Value::Number(1.0));

        let left = Environment::with_enclosing(Rc::clone(&global)).into_ref();
        let right = Environment::with_enclosing(Rc::clone(&global)).into_ref();

        Environment::assign_at(&left, 1, &ident("x"), Value::Number(2.0)).unwrap();

        let seen = Environment::get_at(&right, 1, "x", 1).unwrap();
        assert_eq!(seen, Value::Number(2.0));
    }

    #[test]
    fn assign_to_undefined_is_an_error() {
        let mut env = Environment::new();

        let err = env.assign(&ident("nope"), Value::Nil).unwrap_err();
        assert_eq!(err.message(), "Undefined variable 'nope'.");
    }

    #[test]
    fn ancestor_past_the_root_is_none() {
        let global = Environment::new().into_ref();
        assert!(Environment::ancestor(&global, 1).is_none());
    }
}
