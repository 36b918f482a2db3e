// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier hook doubles.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use warpdrive_core::{GenerationInput, IdentifierError, IdentifierHooks, ResourceView};

/// Call counters shared with the hooks built by [`HookCounters::hooks`].
///
/// Clones share the counters.
#[derive(Clone, Debug, Default)]
pub struct HookCounters {
    updates: Rc<Cell<usize>>,
    resets: Rc<Cell<usize>>,
    forgotten: Rc<RefCell<Vec<String>>>,
}

impl HookCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update, forget and reset hooks that count their calls. Generation is
    /// left to the built-in method.
    pub fn hooks(&self) -> IdentifierHooks {
        self.install(IdentifierHooks::default())
    }

    /// Adds counting update, forget and reset hooks to `hooks`.
    pub fn install(&self, hooks: IdentifierHooks) -> IdentifierHooks {
        let updates = Rc::clone(&self.updates);
        let resets = Rc::clone(&self.resets);
        let forgotten = Rc::clone(&self.forgotten);
        hooks
            .with_update(move |_, _, _| updates.set(updates.get() + 1))
            .with_forget(move |identifier, _| {
                forgotten.borrow_mut().push(identifier.lid().to_owned());
            })
            .with_reset(move || resets.set(resets.get() + 1))
    }

    /// Number of update calls.
    pub fn updates(&self) -> usize {
        self.updates.get()
    }

    /// Number of reset calls.
    pub fn resets(&self) -> usize {
        self.resets.get()
    }

    /// Lids passed to the forget hook, in call order.
    pub fn forgotten(&self) -> Vec<String> {
        self.forgotten.borrow().clone()
    }
}

/// Generation and update hooks that key records by a secondary attribute
/// as well as by id.
///
/// Lids are `{type}:{id}` for resources with an id and `{type}:{value}` for
/// resources carrying only the secondary attribute. Once the update hook has
/// seen a resource carrying both, the secondary value resolves to the lid of
/// that record, so later lookups by either key meet on one identifier.
#[derive(Clone, Debug)]
pub struct SecondaryKeyHooks {
    attribute: Rc<str>,
    index: Rc<RefCell<FxHashMap<String, String>>>,
    counters: HookCounters,
}

impl SecondaryKeyHooks {
    /// Hooks keyed by `attribute`.
    pub fn new(attribute: &str) -> Self {
        Self {
            attribute: Rc::from(attribute),
            index: Rc::default(),
            counters: HookCounters::new(),
        }
    }

    /// Counters for the update, forget and reset hooks.
    pub fn counters(&self) -> &HookCounters {
        &self.counters
    }

    /// Lid the secondary `value` currently resolves to, if learned.
    pub fn resolved(&self, value: &str) -> Option<String> {
        self.index.borrow().get(value).cloned()
    }

    /// Builds the hook set.
    pub fn hooks(&self) -> IdentifierHooks {
        let attribute = Rc::clone(&self.attribute);
        let index = Rc::clone(&self.index);
        let generation = move |input: GenerationInput<'_>| match input {
            GenerationInput::Record(view) => record_lid(view, &attribute, &index.borrow()),
            GenerationInput::Document(request) => Ok(request.url.clone()),
        };

        let attribute = Rc::clone(&self.attribute);
        let index = Rc::clone(&self.index);
        let counters = self.counters.clone();
        self.counters
            .install(IdentifierHooks::default().with_generation(generation))
            .with_update(move |identifier, view, _| {
                counters.updates.set(counters.updates.get() + 1);
                if let Some(Value::String(value)) = view.attribute(&attribute) {
                    index
                        .borrow_mut()
                        .insert(value.clone(), identifier.lid().to_owned());
                }
            })
    }
}

fn record_lid(
    view: ResourceView<'_>,
    attribute: &str,
    index: &FxHashMap<String, String>,
) -> Result<Option<String>, IdentifierError> {
    if let Some(lid) = view.lid {
        return Ok(Some(lid.to_owned()));
    }
    if let Some(id) = view.id {
        return Ok(Some(format!("{}:{id}", view.resource_type)));
    }
    if let Some(Value::String(value)) = view.attribute(attribute) {
        let lid = index
            .get(value)
            .cloned()
            .unwrap_or_else(|| format!("{}:{value}", view.resource_type));
        return Ok(Some(lid));
    }
    Err(IdentifierError::Generation(format!(
        "a `{}` resource needs an id or `{attribute}`",
        view.resource_type
    )))
}
