//! Per-thread record of components currently under construction.
//!
//! Every construction pushes a frame for its container and pops it on
//! drop, so a request for a name already on the stack is a cycle. Frames
//! are tagged with the container id: two containers built on one thread
//! never see each other's frames.

use std::cell::RefCell;

use tessera_support::rendering::ChainEntry;

use crate::error::{ContainerError, CyclicConstructionError, Result};
use crate::resolver::InjectionStyle;
use crate::scope::Scope;

struct Frame {
    container: u64,
    component: String,
    scope: Scope,
    via: InjectionStyle,
}

thread_local! {
    static STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// RAII marker for one in-flight construction.
pub(crate) struct InFlight {
    container: u64,
}

impl InFlight {
    /// Pushes a frame, failing once the container's stack is `max_depth`
    /// deep.
    pub(crate) fn enter(
        container: u64,
        component: &str,
        scope: Scope,
        via: InjectionStyle,
        max_depth: usize,
    ) -> Result<Self> {
        STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let depth = stack.iter().filter(|f| f.container == container).count();
            if depth >= max_depth {
                let mut chain: Vec<String> = stack
                    .iter()
                    .filter(|f| f.container == container)
                    .map(|f| f.component.clone())
                    .collect();
                chain.push(component.to_string());
                return Err(ContainerError::CyclicConstruction(CyclicConstructionError { chain }));
            }
            stack.push(Frame {
                container,
                component: component.to_string(),
                scope,
                via,
            });
            Ok(InFlight { container })
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(position) = stack.iter().rposition(|f| f.container == self.container) {
                stack.remove(position);
            }
        });
    }
}

/// Is `component` being built by `container` on this thread?
pub(crate) fn contains(container: u64, component: &str) -> bool {
    STACK.with(|stack| {
        stack
            .borrow()
            .iter()
            .any(|f| f.container == container && f.component == component)
    })
}

/// The chain from the first frame of `component` to a repeated request
/// for it: `[a, b, a]`.
pub(crate) fn cycle_chain(container: u64, component: &str) -> Vec<String> {
    STACK.with(|stack| {
        let stack = stack.borrow();
        let mut chain: Vec<String> = stack
            .iter()
            .filter(|f| f.container == container)
            .skip_while(|f| f.component != component)
            .map(|f| f.component.clone())
            .collect();
        chain.push(component.to_string());
        chain
    })
}

/// All frames of `container`, outermost first, for diagnostics.
pub(crate) fn chain_entries(container: u64) -> Vec<ChainEntry> {
    STACK.with(|stack| {
        stack
            .borrow()
            .iter()
            .filter(|f| f.container == container)
            .enumerate()
            .map(|(i, f)| ChainEntry {
                component: f.component.clone(),
                scope: f.scope.to_string(),
                reached_via: (i > 0).then(|| f.via.to_string()),
            })
            .collect()
    })
}

/// The innermost component `container` is building on this thread.
pub(crate) fn current(container: u64) -> Option<String> {
    STACK.with(|stack| {
        stack
            .borrow()
            .iter()
            .rev()
            .find(|f| f.container == container)
            .map(|f| f.component.clone())
    })
}

/// Number of frames `container` has on this thread.
pub(crate) fn depth(container: u64) -> usize {
    STACK.with(|stack| stack.borrow().iter().filter(|f| f.container == container).count())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 16;

    fn enter(container: u64, component: &str) -> InFlight {
        InFlight::enter(container, component, Scope::Singleton, InjectionStyle::Field, MAX).unwrap()
    }

    #[test]
    fn frames_pop_on_drop() {
        {
            let _a = enter(9001, "a");
            let _b = enter(9001, "b");
            assert!(contains(9001, "a"));
            assert!(contains(9001, "b"));
            assert_eq!(depth(9001), 2);
        }
        assert!(!contains(9001, "a"));
        assert_eq!(depth(9001), 0);
    }

    #[test]
    fn cycle_chain_starts_at_first_occurrence() {
        let _x = enter(9002, "x");
        let _a = enter(9002, "a");
        let _b = enter(9002, "b");
        assert_eq!(cycle_chain(9002, "a"), vec!["a", "b", "a"]);
    }

    #[test]
    fn containers_are_isolated() {
        let _a = enter(9003, "a");
        assert!(!contains(9004, "a"));
        let _other = enter(9004, "a");
        assert_eq!(depth(9003), 1);
        assert_eq!(depth(9004), 1);
    }

    #[test]
    fn depth_guard() {
        let guards: Vec<InFlight> = (0..3).map(|i| enter(9005, &format!("c{i}"))).collect();
        let err = InFlight::enter(9005, "c3", Scope::Singleton, InjectionStyle::Constructor, 3)
            .err()
            .unwrap();
        match err {
            ContainerError::CyclicConstruction(e) => assert_eq!(e.chain.len(), 4),
            other => panic!("Expected CyclicConstruction, got: {other:?}"),
        }
        drop(guards);
    }

    #[test]
    fn chain_entries_annotate_styles() {
        let _a = enter(9006, "a");
        let _b = InFlight::enter(9006, "b", Scope::Transient, InjectionStyle::Constructor, MAX).unwrap();
        let entries = chain_entries(9006);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].reached_via, None);
        assert_eq!(entries[1].scope, "Transient");
        assert_eq!(entries[1].reached_via.as_deref(), Some("constructor"));
    }
}
