//! Scope identifiers and the scope registry.
//!
//! A [`Scope`] is the pair (area template, enclosing closure) that bounds
//! where a node's value is meaningful. Templates form a tree rooted at the
//! global scope; closures hang off the scope they were defined in. A scope
//! nests inside another when the other appears on its ancestor chain.

use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::Name;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Area template handle.
    TemplateId,
    "t"
);
define_id!(
    /// Closure handle.
    ClosureId,
    "c"
);
define_id!(
    /// Global id of an exported area attribute name.
    ExportId,
    "x"
);

/// The (template, closure) pair a node lives in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Scope {
    pub template: Option<TemplateId>,
    pub closure: Option<ClosureId>,
}

impl Scope {
    pub const GLOBAL: Scope = Scope {
        template: None,
        closure: None,
    };

    pub const fn template(id: TemplateId) -> Self {
        Scope {
            template: Some(id),
            closure: None,
        }
    }

    pub fn is_global(self) -> bool {
        self == Scope::GLOBAL
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.template, self.closure) {
            (None, None) => f.write_str("global"),
            (Some(t), None) => write!(f, "{t}"),
            (None, Some(c)) => write!(f, "global/{c}"),
            (Some(t), Some(c)) => write!(f, "{t}/{c}"),
        }
    }
}

/// Scope registry errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    #[error("scopes {left} and {right} do not nest")]
    Incompatible { left: Scope, right: Scope },
    #[error("unknown area template {0}")]
    UnknownTemplate(TemplateId),
    #[error("unknown closure {0}")]
    UnknownClosure(ClosureId),
    #[error("template {parent} already has a child named {name:?}")]
    DuplicateChild { parent: TemplateId, name: Name },
}

/// Area template metadata.
#[derive(Clone, Debug)]
pub struct TemplateInfo {
    pub name: Name,
    pub parent: Option<TemplateId>,
    /// Number of templates on the path from the root, the root itself at 1.
    pub depth: u32,
    children: FxHashMap<Name, TemplateId>,
    classes: SmallVec<[Name; 4]>,
    exports: Vec<ExportId>,
}

#[derive(Clone, Debug)]
struct ClosureInfo {
    parent: Scope,
    depth: u32,
}

/// Registry of area templates, closures and exported attribute names.
#[derive(Clone, Debug, Default)]
pub struct ScopeTree {
    templates: Vec<TemplateInfo>,
    closures: Vec<ClosureInfo>,
    export_names: Vec<Name>,
    export_ids: FxHashMap<Name, ExportId>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template. `parent == None` makes it a root.
    pub fn add_template(
        &mut self,
        name: Name,
        parent: Option<TemplateId>,
    ) -> Result<TemplateId, ScopeError> {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "template count is bounded by the program size"
        )]
        let id = TemplateId::new(self.templates.len() as u32);
        let depth = match parent {
            Some(p) => {
                let info = self
                    .templates
                    .get_mut(p.index())
                    .ok_or(ScopeError::UnknownTemplate(p))?;
                if info.children.contains_key(&name) {
                    return Err(ScopeError::DuplicateChild { parent: p, name });
                }
                info.children.insert(name, id);
                info.depth + 1
            }
            None => 1,
        };
        self.templates.push(TemplateInfo {
            name,
            parent,
            depth,
            children: FxHashMap::default(),
            classes: SmallVec::new(),
            exports: Vec::new(),
        });
        Ok(id)
    }

    /// Register a closure defined in `parent`.
    pub fn add_closure(&mut self, parent: Scope) -> Result<ClosureId, ScopeError> {
        self.check(parent)?;
        let depth = self.closure_depth(parent) + 1;
        #[expect(
            clippy::cast_possible_truncation,
            reason = "closure count is bounded by the program size"
        )]
        let id = ClosureId::new(self.closures.len() as u32);
        self.closures.push(ClosureInfo { parent, depth });
        Ok(id)
    }

    /// Scope of the body of `closure`.
    pub fn closure_scope(&self, closure: ClosureId) -> Result<Scope, ScopeError> {
        let info = self
            .closures
            .get(closure.index())
            .ok_or(ScopeError::UnknownClosure(closure))?;
        Ok(Scope {
            template: info.parent.template,
            closure: Some(closure),
        })
    }

    /// Validate that every id in `scope` is registered.
    pub fn check(&self, scope: Scope) -> Result<(), ScopeError> {
        if let Some(t) = scope.template {
            self.template(t)?;
        }
        if let Some(c) = scope.closure {
            let info = self
                .closures
                .get(c.index())
                .ok_or(ScopeError::UnknownClosure(c))?;
            if info.parent.template != scope.template {
                return Err(ScopeError::Incompatible {
                    left: scope,
                    right: info.parent,
                });
            }
        }
        Ok(())
    }

    pub fn template(&self, id: TemplateId) -> Result<&TemplateInfo, ScopeError> {
        self.templates
            .get(id.index())
            .ok_or(ScopeError::UnknownTemplate(id))
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    pub fn templates(&self) -> impl Iterator<Item = TemplateId> {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "template count is bounded by the program size"
        )]
        let count = self.templates.len() as u32;
        (0..count).map(TemplateId::new)
    }

    pub fn child(&self, parent: TemplateId, name: Name) -> Option<TemplateId> {
        self.templates
            .get(parent.index())
            .and_then(|info| info.children.get(&name).copied())
    }

    /// Children of a template, ordered by id.
    pub fn children(&self, parent: TemplateId) -> Vec<TemplateId> {
        let mut out: Vec<TemplateId> = self
            .templates
            .get(parent.index())
            .map(|info| info.children.values().copied().collect())
            .unwrap_or_default();
        out.sort_unstable();
        out
    }

    /// Enclosing scope one step out, `None` for the global scope.
    pub fn parent_scope(&self, scope: Scope) -> Option<Scope> {
        if let Some(c) = scope.closure {
            return self.closures.get(c.index()).map(|info| info.parent);
        }
        let t = scope.template?;
        Some(Scope {
            template: self.templates.get(t.index()).and_then(|info| info.parent),
            closure: None,
        })
    }

    /// Nesting depth: templates on the path from the root plus enclosing
    /// closures. The global scope has depth 0.
    pub fn depth(&self, scope: Scope) -> u32 {
        let template_depth = scope
            .template
            .and_then(|t| self.templates.get(t.index()))
            .map_or(0, |info| info.depth);
        template_depth + self.closure_depth(scope)
    }

    fn closure_depth(&self, scope: Scope) -> u32 {
        scope
            .closure
            .and_then(|c| self.closures.get(c.index()))
            .map_or(0, |info| info.depth)
    }

    /// Whether `inner` equals `outer` or lies inside it.
    pub fn nests(&self, inner: Scope, outer: Scope) -> bool {
        if self.depth(inner) < self.depth(outer) {
            return false;
        }
        let mut current = Some(inner);
        while let Some(scope) = current {
            if scope == outer {
                return true;
            }
            current = self.parent_scope(scope);
        }
        false
    }

    /// The more specific of two nesting scopes.
    pub fn least_common_scope(&self, a: Scope, b: Scope) -> Result<Scope, ScopeError> {
        if self.nests(a, b) {
            Ok(a)
        } else if self.nests(b, a) {
            Ok(b)
        } else {
            Err(ScopeError::Incompatible { left: a, right: b })
        }
    }

    /// Whether `scope` is inside the body of `closure`.
    pub fn in_closure(&self, scope: Scope, closure: ClosureId) -> bool {
        let mut current = Some(scope);
        while let Some(s) = current {
            match s.closure {
                Some(c) if c == closure => return true,
                Some(_) => current = self.parent_scope(s),
                None => return false,
            }
        }
        false
    }

    pub fn add_class(&mut self, template: TemplateId, class: Name) -> Result<(), ScopeError> {
        let info = self
            .templates
            .get_mut(template.index())
            .ok_or(ScopeError::UnknownTemplate(template))?;
        if !info.classes.contains(&class) {
            info.classes.push(class);
        }
        Ok(())
    }

    pub fn is_member(&self, template: TemplateId, class: Name) -> bool {
        self.templates
            .get(template.index())
            .is_some_and(|info| info.classes.contains(&class))
    }

    /// Global export id for an attribute name, allocated on first use.
    pub fn export_id(&mut self, name: Name) -> ExportId {
        if let Some(&id) = self.export_ids.get(&name) {
            return id;
        }
        #[expect(
            clippy::cast_possible_truncation,
            reason = "export names are bounded by the program size"
        )]
        let id = ExportId::new(self.export_names.len() as u32);
        self.export_names.push(name);
        self.export_ids.insert(name, id);
        id
    }

    pub fn lookup_export(&self, name: Name) -> Option<ExportId> {
        self.export_ids.get(&name).copied()
    }

    pub fn export_name(&self, id: ExportId) -> Option<Name> {
        self.export_names.get(id.index()).copied()
    }

    /// Declare that `template` exports the attribute `name`.
    pub fn add_export(&mut self, template: TemplateId, name: Name) -> Result<ExportId, ScopeError> {
        self.template(template)?;
        let id = self.export_id(name);
        let info = &mut self.templates[template.index()];
        if !info.exports.contains(&id) {
            info.exports.push(id);
        }
        Ok(id)
    }

    pub fn exports(&self, template: TemplateId) -> &[ExportId] {
        self.templates
            .get(template.index())
            .map_or(&[], |info| info.exports.as_slice())
    }

    pub fn has_export(&self, template: TemplateId, id: ExportId) -> bool {
        self.exports(template).contains(&id)
    }
}
