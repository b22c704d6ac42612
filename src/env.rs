//! Lexical environments and stack-slot allocation.
//!
//! Every function owns a [`ScopeTree`]: an arena of scopes addressed by
//! [`ScopeId`], with parent and child links stored as indices. The parser
//! grows the tree as it enters blocks and loops; once a function is parsed,
//! [`ScopeTree::allocate`] walks it and hands every binding an `%rbp`-relative
//! slot. Sibling scopes never live at the same time, so they start from the
//! same offset and share storage.

use indexmap::IndexMap;
use log::trace;

use crate::asm::MemoryLocation;
use crate::ty::Type;

/// Size in bytes of one variable slot. Only scalars exist, so every binding
/// takes exactly one machine word.
pub const SLOT_SIZE: i64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// Visibility phase of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclState {
  /// Known to the parser; not yet initialised in generated code.
  Registered,
  /// Its declaration has been lowered, so generated code may read it.
  Declared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
  pub ty: Type,
  pub location: Option<MemoryLocation>,
  pub state: DeclState,
}

impl Binding {
  fn new(ty: Type) -> Self {
    Self {
      ty,
      location: None,
      state: DeclState::Registered,
    }
  }

  pub fn is_declared(&self) -> bool {
    self.state == DeclState::Declared
  }
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
  parent: Option<ScopeId>,
  bindings: IndexMap<String, Binding>,
  children: Vec<ScopeId>,
}

impl Scope {
  pub fn parent(&self) -> Option<ScopeId> {
    self.parent
  }

  pub fn children(&self) -> &[ScopeId] {
    &self.children
  }

  /// Bindings in declaration order.
  pub fn bindings(&self) -> impl Iterator<Item = (&str, &Binding)> {
    self.bindings.iter().map(|(name, binding)| (name.as_str(), binding))
  }
}

/// Returned when a name is declared twice in one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redeclaration;

#[derive(Debug, Clone)]
pub struct ScopeTree {
  scopes: Vec<Scope>,
}

impl Default for ScopeTree {
  fn default() -> Self {
    Self::new()
  }
}

impl ScopeTree {
  /// Create a tree holding only the function-level root scope.
  pub fn new() -> Self {
    Self {
      scopes: vec![Scope::default()],
    }
  }

  pub fn root(&self) -> ScopeId {
    ScopeId(0)
  }

  pub fn scope(&self, id: ScopeId) -> &Scope {
    &self.scopes[id.0]
  }

  pub fn len(&self) -> usize {
    self.scopes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.scopes.is_empty()
  }

  /// Open a nested scope under `parent`.
  pub fn push_child(&mut self, parent: ScopeId) -> ScopeId {
    let id = ScopeId(self.scopes.len());
    self.scopes.push(Scope {
      parent: Some(parent),
      ..Scope::default()
    });
    self.scopes[parent.0].children.push(id);
    id
  }

  /// Register `name` in `scope`. Shadowing an outer binding is fine; a
  /// second binding of the same name in the same scope is not.
  pub fn register(&mut self, scope: ScopeId, name: &str, ty: Type) -> Result<(), Redeclaration> {
    let bindings = &mut self.scopes[scope.0].bindings;
    if bindings.contains_key(name) {
      return Err(Redeclaration);
    }
    bindings.insert(name.to_string(), Binding::new(ty));
    Ok(())
  }

  /// Ancestor chain starting at `scope` itself.
  pub fn chain(&self, scope: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
    std::iter::successors(Some(scope), |id| self.scopes[id.0].parent)
  }

  /// Innermost binding of `name` visible from `scope`, in any state.
  pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<&Binding> {
    self
      .chain(scope)
      .find_map(|id| self.scopes[id.0].bindings.get(name))
  }

  /// Innermost binding of `name` visible from `scope` whose declaration has
  /// already been lowered.
  pub fn lookup_declared(&self, scope: ScopeId, name: &str) -> Option<&Binding> {
    self.chain(scope).find_map(|id| {
      self.scopes[id.0]
        .bindings
        .get(name)
        .filter(|binding| binding.is_declared())
    })
  }

  /// Like [`ScopeTree::lookup`], but ignores the binding of `name` owned by
  /// `skip`.
  pub fn lookup_excluding(&self, scope: ScopeId, name: &str, skip: ScopeId) -> Option<&Binding> {
    self
      .chain(scope)
      .filter(|id| *id != skip)
      .find_map(|id| self.scopes[id.0].bindings.get(name))
  }

  /// Binding of `name` owned directly by `scope`.
  pub fn local(&self, scope: ScopeId, name: &str) -> Option<&Binding> {
    self.scopes[scope.0].bindings.get(name)
  }

  /// Promote the binding owned by `scope` to [`DeclState::Declared`].
  /// Returns `None` when `scope` has no such binding.
  pub fn mark_declared(&mut self, scope: ScopeId, name: &str) -> Option<&Binding> {
    let binding = self.scopes[scope.0].bindings.get_mut(name)?;
    binding.state = DeclState::Declared;
    Some(binding)
  }

  /// Assign every binding a frame slot and return the deepest offset used.
  ///
  /// Slots are handed out in declaration order, `SLOT_SIZE` bytes apart,
  /// growing downward from `%rbp`. Each child starts where its parent's own
  /// bindings end, so siblings overlap while ancestors and descendants never
  /// do. The result is not rounded; alignment is the code generator's job.
  pub fn allocate(&mut self) -> i64 {
    let root = self.root();
    self.allocate_scope(root, 0)
  }

  fn allocate_scope(&mut self, id: ScopeId, start: i64) -> i64 {
    let mut depth = start;
    for (name, binding) in self.scopes[id.0].bindings.iter_mut() {
      depth += SLOT_SIZE;
      binding.location = Some(MemoryLocation::frame(-depth));
      trace!("slot {name} -> -{depth}(%rbp)");
    }

    let mut deepest = depth;
    for idx in 0..self.scopes[id.0].children.len() {
      let child = self.scopes[id.0].children[idx];
      deepest = deepest.max(self.allocate_scope(child, depth));
    }
    deepest
  }

  /// Whether every binding in the tree has a slot.
  pub fn is_fully_allocated(&self) -> bool {
    self
      .scopes
      .iter()
      .flat_map(|scope| scope.bindings.values())
      .all(|binding| binding.location.is_some())
  }
}
