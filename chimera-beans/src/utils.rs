//! Utility functions for the container

/// Naming convention utilities for bean names
pub mod naming {
    /// Converts a PascalCase type name to camelCase for bean naming.
    ///
    /// This is the default bean naming strategy: `UserService` becomes `userService`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chimera_beans::utils::naming::to_camel_case;
    ///
    /// assert_eq!(to_camel_case("UserService"), "userService");
    /// assert_eq!(to_camel_case("A"), "a");
    /// assert_eq!(to_camel_case(""), "");
    /// ```
    pub fn to_camel_case(s: &str) -> String {
        let mut chars = s.chars();
        match chars.next() {
            None => String::new(),
            Some(first) => {
                let mut result = String::with_capacity(s.len());
                result.extend(first.to_lowercase());
                result.push_str(chars.as_str());
                result
            }
        }
    }

    /// Strips the factory dereference prefix (`&name` -> `name`).
    pub fn transformed_bean_name(name: &str) -> &str {
        name.trim_start_matches(crate::FACTORY_BEAN_PREFIX)
    }

    pub fn is_factory_dereference(name: &str) -> bool {
        name.starts_with(crate::FACTORY_BEAN_PREFIX)
    }
}

/// Dependency resolution utilities
pub mod dependency {
    use std::collections::{HashMap, HashSet};
    use std::thread::ThreadId;

    use parking_lot::Mutex;

    /// Tracks beans currently being created, per thread.
    ///
    /// Used for scopes without an early-reference path (prototype and custom scopes):
    /// re-entering a name on the same thread means an unresolvable cycle.
    #[derive(Debug, Default)]
    pub struct CreationTracker {
        creating: Mutex<HashMap<ThreadId, Vec<String>>>,
    }

    impl CreationTracker {
        pub fn new() -> Self {
            Self::default()
        }

        /// Checks if a bean is currently being created by the calling thread.
        pub fn is_creating(&self, name: &str) -> bool {
            let thread = std::thread::current().id();
            self.creating
                .lock()
                .get(&thread)
                .is_some_and(|names| names.iter().any(|n| n == name))
        }

        /// Marks a bean as being created by the calling thread.
        ///
        /// Returns `false` if the thread was already creating it (circular dependency).
        pub fn start_creating(&self, name: &str) -> bool {
            let thread = std::thread::current().id();
            let mut creating = self.creating.lock();
            let names = creating.entry(thread).or_default();
            if names.iter().any(|n| n == name) {
                return false;
            }
            names.push(name.to_string());
            true
        }

        pub fn finish_creating(&self, name: &str) {
            let thread = std::thread::current().id();
            let mut creating = self.creating.lock();
            if let Some(names) = creating.get_mut(&thread) {
                if let Some(index) = names.iter().rposition(|n| n == name) {
                    names.remove(index);
                }
                if names.is_empty() {
                    creating.remove(&thread);
                }
            }
        }

        /// Creation chain of the calling thread, outermost first.
        pub fn current_creating(&self) -> Vec<String> {
            let thread = std::thread::current().id();
            self.creating
                .lock()
                .get(&thread)
                .cloned()
                .unwrap_or_default()
        }
    }

    /// Dependency graph analysis result
    #[derive(Debug)]
    pub enum DependencyValidationError {
        /// Circular dependency detected
        CircularDependency {
            /// The dependency chain forming the cycle
            cycle: Vec<String>,
        },
        /// Missing dependency detected
        MissingDependency {
            /// The bean that requires the dependency
            bean: String,
            /// The missing dependency
            missing: String,
        },
    }

    impl std::fmt::Display for DependencyValidationError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::CircularDependency { cycle } => {
                    write!(f, "Circular dependency detected: {}", cycle.join(" -> "))
                }
                Self::MissingDependency { bean, missing } => {
                    write!(f, "Bean '{}' depends on '{}' which is not registered", bean, missing)
                }
            }
        }
    }

    /// Validates a dependency graph for cycles and missing beans.
    ///
    /// `known` holds names that satisfy a dependency without appearing as graph keys
    /// (aliases, manually registered singletons). Bean names are visited in sorted
    /// order so the reported cycle is deterministic.
    pub fn validate_dependency_graph(
        dependencies: &HashMap<String, Vec<String>>,
        known: &HashSet<String>,
    ) -> Result<(), DependencyValidationError> {
        let mut names: Vec<&String> = dependencies.keys().collect();
        names.sort();

        for bean_name in &names {
            for dep in &dependencies[*bean_name] {
                if !dependencies.contains_key(dep) && !known.contains(dep) {
                    return Err(DependencyValidationError::MissingDependency {
                        bean: (*bean_name).clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }

        let mut visited = HashSet::new();
        let mut rec_stack = Vec::new();

        for bean_name in names {
            if !visited.contains(bean_name) {
                if let Some(cycle) = detect_cycle_dfs(bean_name, dependencies, &mut visited, &mut rec_stack) {
                    return Err(DependencyValidationError::CircularDependency { cycle });
                }
            }
        }

        Ok(())
    }

    fn detect_cycle_dfs(
        node: &str,
        graph: &HashMap<String, Vec<String>>,
        visited: &mut HashSet<String>,
        rec_stack: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        rec_stack.push(node.to_string());

        if let Some(deps) = graph.get(node) {
            for dep in deps {
                if let Some(start_idx) = rec_stack.iter().position(|x| x == dep) {
                    let mut cycle = rec_stack[start_idx..].to_vec();
                    cycle.push(dep.to_string());
                    return Some(cycle);
                }
                if !visited.contains(dep) {
                    if let Some(cycle) = detect_cycle_dfs(dep, graph, visited, rec_stack) {
                        return Some(cycle);
                    }
                }
            }
        }

        rec_stack.pop();
        None
    }
}
