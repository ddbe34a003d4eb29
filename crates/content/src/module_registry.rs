/// Module id returned when a path does not belong to any known data module.
pub const UNRESOLVED_MODULE: i32 = -1;

/// Maps a content path to the id of the data module that owns it.
pub trait ModuleRegistry: Send + Sync {
    fn module_id_from_path(&self, path: &str) -> i32;
}

/// Registry where a module is a top-level directory (`Base.rte/...`) and its
/// id is the registration order.
#[derive(Debug, Default, Clone)]
pub struct DataModules {
    names: Vec<String>,
}

impl DataModules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module directory and returns its id. Registering the same
    /// name twice returns the existing id.
    pub fn register(&mut self, name: impl Into<String>) -> i32 {
        let name = name.into();
        if let Some(id) = self.id_of(&name) {
            return id;
        }
        self.names.push(name);
        (self.names.len() - 1) as i32
    }

    pub fn id_of(&self, name: &str) -> Option<i32> {
        self.names.iter().position(|n| n == name).map(|i| i as i32)
    }

    pub fn name_of(&self, id: i32) -> Option<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }
}

impl ModuleRegistry for DataModules {
    fn module_id_from_path(&self, path: &str) -> i32 {
        path.split('/')
            .find(|segment| !segment.is_empty())
            .and_then(|first| self.id_of(first))
            .unwrap_or(UNRESOLVED_MODULE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_segment_selects_module() {
        let mut modules = DataModules::new();
        assert_eq!(modules.register("Base.rte"), 0);
        assert_eq!(modules.register("Dummy.rte"), 1);
        assert_eq!(modules.register("Base.rte"), 0);

        assert_eq!(modules.module_id_from_path("Dummy.rte/Actors/a.png"), 1);
        assert_eq!(modules.module_id_from_path("/Base.rte/b.wav"), 0);
        assert_eq!(
            modules.module_id_from_path("Unknown.rte/c.png"),
            UNRESOLVED_MODULE
        );
        assert_eq!(modules.name_of(1), Some("Dummy.rte"));
        assert_eq!(modules.name_of(-1), None);
    }
}
