//! Reclaims scopes and instances that only keep each other alive.
//!
//! A function value stored in a scope holds that same scope as its closure,
//! so the pair never reaches a zero reference count.  The heap remembers
//! (weakly) every scope still referenced after its block exited, every
//! instance, and the globals.  A collection walks the graph reachable from
//! those and counts, for each node, the references found inside the graph.
//! A node whose strong count is higher is held from outside (the
//! interpreter, a value on the Rust stack, an embedder) and keeps
//! everything it reaches alive.  Bindings and fields of the remaining nodes
//! are emptied, which breaks their cycles and lets `Rc` free them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use log::debug;

use crate::class::{LoxClass, LoxInstance};
use crate::environment::{EnvRef, Environment};
use crate::function::LoxFunction;
use crate::value::Value;

/// Tracked handles allowed before the first collection.
const INITIAL_THRESHOLD: usize = 1024;

type InstanceRef = Rc<RefCell<LoxInstance>>;

pub struct Heap {
    scopes: Vec<Weak<RefCell<Environment>>>,
    instances: Vec<Weak<RefCell<LoxInstance>>>,
    threshold: usize,
}

/// One reference-counted object of the runtime graph.
enum Node {
    Scope(EnvRef),
    Function(Rc<LoxFunction>),
    Class(Rc<LoxClass>),
    Instance(InstanceRef),
}

struct Entry {
    node: Node,
    /// References to this node held by other nodes of the graph.
    internal: usize,
    /// Could not be inspected; treated as reachable.
    pinned: bool,
    live: bool,
}

impl Node {
    fn of(value: &Value) -> Option<Node> {
        match value {
            Value::Function(function) => Some(Node::Function(Rc::clone(function))),
            Value::Class(class) => Some(Node::Class(Rc::clone(class))),
            Value::Instance(instance) => Some(Node::Instance(Rc::clone(instance))),
            Value::Nil | Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Native(_) => {
                None
            }
        }
    }

    fn key(&self) -> *const () {
        match self {
            Node::Scope(scope) => Rc::as_ptr(scope) as *const (),
            Node::Function(function) => Rc::as_ptr(function) as *const (),
            Node::Class(class) => Rc::as_ptr(class) as *const (),
            Node::Instance(instance) => Rc::as_ptr(instance) as *const (),
        }
    }

    fn strong_count(&self) -> usize {
        match self {
            Node::Scope(scope) => Rc::strong_count(scope),
            Node::Function(function) => Rc::strong_count(function),
            Node::Class(class) => Rc::strong_count(class),
            Node::Instance(instance) => Rc::strong_count(instance),
        }
    }

    /// Every strong reference this node holds, once per reference.  `None`
    /// if the node is borrowed anywhere right now.
    fn children(&self) -> Option<Vec<Node>> {
        let mut children = Vec::new();

        match self {
            Node::Scope(scope) => {
                let scope = scope.try_borrow_mut().ok()?;
                children.extend(scope.values().filter_map(Node::of));
                if let Some(enclosing) = scope.enclosing() {
                    children.push(Node::Scope(Rc::clone(enclosing)));
                }
            }

            Node::Function(function) => {
                children.push(Node::Scope(Rc::clone(function.closure())));
            }

            Node::Class(class) => {
                if let Some(superclass) = class.superclass() {
                    children.push(Node::Class(Rc::clone(superclass)));
                }
                children.extend(class.methods().map(|m| Node::Function(Rc::clone(m))));
            }

            Node::Instance(instance) => {
                let instance = instance.try_borrow_mut().ok()?;
                children.push(Node::Class(Rc::clone(&instance.class)));
                children.extend(instance.fields().filter_map(Node::of));
            }
        }

        Some(children)
    }
}

impl Heap {
    pub fn new() -> Self {
        Self {
            scopes: Vec::new(),
            instances: Vec::new(),
            threshold: INITIAL_THRESHOLD,
        }
    }

    pub fn track_scope(&mut self, scope: &EnvRef) {
        self.scopes.push(Rc::downgrade(scope));
    }

    pub fn track_instance(&mut self, instance: &InstanceRef) {
        self.instances.push(Rc::downgrade(instance));
    }

    /// Number of tracked handles, including ones already freed since the
    /// last collection.
    pub fn tracked(&self) -> usize {
        self.scopes.len() + self.instances.len()
    }

    pub fn collect_if_due(&mut self) {
        if self.tracked() >= self.threshold {
            self.collect();
        }
    }

    pub fn collect(&mut self) {
        let mut graph: HashMap<*const (), Entry> = HashMap::new();
        let mut pending: Vec<*const ()> = Vec::new();

        let roots = self
            .scopes
            .iter()
            .filter_map(|scope| scope.upgrade().map(Node::Scope))
            .chain(
                self.instances
                    .iter()
                    .filter_map(|instance| instance.upgrade().map(Node::Instance)),
            );

        for node in roots {
            insert(&mut graph, &mut pending, node);
        }

        // Count the references each node receives from inside the graph.
        while let Some(key) = pending.pop() {
            let Some(entry) = graph.get_mut(&key) else {
                continue;
            };
            let Some(children) = entry.node.children() else {
                entry.pinned = true;
                continue;
            };

            for child in children {
                let child_key = child.key();
                if !graph.contains_key(&child_key) {
                    insert(&mut graph, &mut pending, child);
                } else {
                    drop(child);
                }
                if let Some(child) = graph.get_mut(&child_key) {
                    child.internal += 1;
                }
            }
        }

        // The graph itself holds one reference to every node.
        let mut reachable: Vec<*const ()> = graph
            .iter()
            .filter(|(_, entry)| entry.pinned || entry.node.strong_count() - 1 > entry.internal)
            .map(|(key, _)| *key)
            .collect();

        while let Some(key) = reachable.pop() {
            let Some(entry) = graph.get_mut(&key) else {
                continue;
            };
            if entry.live {
                continue;
            }
            entry.live = true;

            if let Some(children) = entry.node.children() {
                reachable.extend(children.iter().map(Node::key));
            }
        }

        // Emptied contents are dropped only after every borrow is released.
        let mut garbage: Vec<HashMap<String, Value>> = Vec::new();
        for entry in graph.values().filter(|entry| !entry.live) {
            match &entry.node {
                Node::Scope(scope) => {
                    garbage.push(scope.borrow_mut().take_values());
                }
                Node::Instance(instance) => {
                    garbage.push(instance.borrow_mut().take_fields());
                }
                Node::Function(_) | Node::Class(_) => {}
            }
        }

        let examined = graph.len();
        let reclaimed = garbage.len();
        drop(garbage);
        drop(graph);

        self.scopes.retain(|scope| scope.strong_count() > 0);
        self.instances.retain(|instance| instance.strong_count() > 0);
        self.threshold = (self.tracked() * 2).max(INITIAL_THRESHOLD);

        debug!(
            "Collected: examined {} node(s), emptied {}, {} handle(s) still tracked",
            examined,
            reclaimed,
            self.tracked()
        );
    }
}

fn insert(graph: &mut HashMap<*const (), Entry>, pending: &mut Vec<*const ()>, node: Node) {
    let key = node.key();

    graph.entry(key).or_insert_with(|| {
        pending.push(key);
        Entry {
            node,
            internal: 0,
            pinned: false,
            live: false,
        }
    });
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

/// Whatever the embedder no longer holds is reclaimed with the heap.
impl Drop for Heap {
    fn drop(&mut self) {
        self.collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FunctionDecl;
    use crate::token::{Token, TokenType};

    fn function_in(scope: &EnvRef) -> Value {
        let declaration = Rc::new(FunctionDecl {
            name: Token::new(TokenType::IDENTIFIER, "f", None, 1),
            params: Vec::new(),
            body: Vec::new(),
        });

        Value::Function(Rc::new(LoxFunction::new(
            declaration,
            Rc::clone(scope),
            false,
        )))
    }

    #[test]
    fn scope_holding_its_own_closure_is_reclaimed() {
        let mut heap = Heap::new();
        let scope = Environment::new().into_ref();
        let function = function_in(&scope);
        scope.borrow_mut().define("f", function);
        heap.track_scope(&scope);

        let weak = Rc::downgrade(&scope);
        drop(scope);
        assert!(weak.upgrade().is_some());

        heap.collect();
        assert!(weak.upgrade().is_none());
        assert_eq!(heap.tracked(), 0);
    }

    #[test]
    fn externally_held_scope_keeps_its_bindings() {
        let mut heap = Heap::new();
        let scope = Environment::new().into_ref();
        let function = function_in(&scope);
        scope.borrow_mut().define("f", function);
        scope.borrow_mut().define("n", Value::Number(1.0));
        heap.track_scope(&scope);

        heap.collect();

        assert_eq!(scope.borrow().values().count(), 2);
        assert_eq!(heap.tracked(), 1);
    }

    #[test]
    fn closure_held_from_outside_keeps_its_scope() {
        let mut heap = Heap::new();
        let scope = Environment::new().into_ref();
        let function = function_in(&scope);
        scope.borrow_mut().define("f", function.clone());
        scope.borrow_mut().define("n", Value::Number(1.0));
        heap.track_scope(&scope);

        let weak = Rc::downgrade(&scope);
        drop(scope);
        heap.collect();

        let scope = weak.upgrade().expect("scope still reachable");
        assert_eq!(scope.borrow().values().count(), 2);
        drop(function);
    }

    #[test]
    fn instance_referring_to_itself_is_reclaimed() {
        let mut heap = Heap::new();
        let class = Rc::new(LoxClass::new("Node", None, HashMap::new()));
        let instance = Rc::new(RefCell::new(LoxInstance::new(class)));
        let name = Token::new(TokenType::IDENTIFIER, "next", None, 1);
        instance
            .borrow_mut()
            .set(&name, Value::Instance(Rc::clone(&instance)));
        heap.track_instance(&instance);

        let weak = Rc::downgrade(&instance);
        drop(instance);

        heap.collect();
        assert!(weak.upgrade().is_none());
    }
}
