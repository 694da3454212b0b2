use super::{DependencyInfo, DependencyType, ProjectCoordinateResolver};
use crate::coordinates::ProjectCoordinate;
use mini_moka::sync::Cache;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

const RESULT_CACHE_CAPACITY: u64 = 10_000;

/// Composite resolver: manual mappings, then strategies in registration order.
///
/// Resolved coordinates are cached per dependency. Misses are not: a
/// strategy may answer later, e.g. once the index is open. Manual mappings
/// are never cached and always win over strategy results.
pub struct MappingProvider {
    strategies: RwLock<Vec<Arc<dyn ProjectCoordinateResolver>>>,
    manual_mappings: RwLock<HashMap<DependencyInfo, ProjectCoordinate>>,
    cache: Cache<DependencyInfo, ProjectCoordinate>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for MappingProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingProvider {
    pub fn new() -> Self {
        Self {
            strategies: RwLock::new(Vec::new()),
            manual_mappings: RwLock::new(HashMap::new()),
            cache: Cache::builder().max_capacity(RESULT_CACHE_CAPACITY).build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Append a strategy. Strategies are asked in registration order.
    pub fn add_strategy(&self, strategy: Arc<dyn ProjectCoordinateResolver>) {
        if let Ok(mut strategies) = self.strategies.write() {
            strategies.push(strategy);
        }
        self.cache.invalidate_all();
    }

    pub fn set_strategies(&self, new_strategies: Vec<Arc<dyn ProjectCoordinateResolver>>) {
        if let Ok(mut strategies) = self.strategies.write() {
            *strategies = new_strategies;
        }
        self.cache.invalidate_all();
    }

    pub fn strategies(&self) -> Vec<Arc<dyn ProjectCoordinateResolver>> {
        self.strategies
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Pin `dependency` to `coordinate`, overriding every strategy.
    pub fn set_manual_mapping(&self, dependency: DependencyInfo, coordinate: ProjectCoordinate) {
        debug!("Manual mapping {} -> {}", dependency, coordinate);
        self.cache.invalidate(&dependency);
        if let Ok(mut mappings) = self.manual_mappings.write() {
            mappings.insert(dependency, coordinate);
        }
    }

    pub fn remove_manual_mapping(&self, dependency: &DependencyInfo) -> Option<ProjectCoordinate> {
        self.cache.invalidate(dependency);
        self.manual_mappings
            .write()
            .ok()
            .and_then(|mut mappings| mappings.remove(dependency))
    }

    /// Forget every cached strategy result, e.g. after the index changed.
    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    fn manual_mapping(&self, dependency: &DependencyInfo) -> Option<ProjectCoordinate> {
        match self.manual_mappings.read() {
            Ok(mappings) => mappings.get(dependency).cloned(),
            Err(_) => {
                warn!("Manual mapping table poisoned, ignoring overrides");
                None
            }
        }
    }

    fn search_strategies(&self, dependency: &DependencyInfo) -> Option<ProjectCoordinate> {
        for strategy in self.strategies() {
            if let Some(pc) = strategy.search_for_project_coordinate(dependency) {
                debug!("{} resolved {} to {}", strategy.name(), dependency, pc);
                return Some(pc);
            }
        }
        debug!("No strategy resolved {}", dependency);
        None
    }
}

impl ProjectCoordinateResolver for MappingProvider {
    fn is_applicable(&self, kind: DependencyType) -> bool {
        self.strategies().iter().any(|s| s.is_applicable(kind))
    }

    fn do_search(&self, dependency: &DependencyInfo) -> Option<ProjectCoordinate> {
        if let Some(cached) = self.cache.get(dependency) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(cached);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = self.search_strategies(dependency);
        if let Some(pc) = &result {
            self.cache.insert(dependency.clone(), pc.clone());
        }
        result
    }

    /// Manual mappings win even for kinds no strategy is applicable to.
    fn search_for_project_coordinate(
        &self,
        dependency: &DependencyInfo,
    ) -> Option<ProjectCoordinate> {
        if let Some(pc) = self.manual_mapping(dependency) {
            return Some(pc);
        }
        self.do_search(dependency)
    }

    fn name(&self) -> &str {
        "mapping-provider"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct FixedStrategy {
        kind: DependencyType,
        result: Mutex<Option<ProjectCoordinate>>,
        calls: AtomicUsize,
    }

    impl FixedStrategy {
        fn new(kind: DependencyType, result: Option<ProjectCoordinate>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                result: Mutex::new(result),
                calls: AtomicUsize::new(0),
            })
        }

        fn answer(&self, result: Option<ProjectCoordinate>) {
            *self.result.lock().unwrap() = result;
        }
    }

    impl ProjectCoordinateResolver for FixedStrategy {
        fn is_applicable(&self, kind: DependencyType) -> bool {
            kind == self.kind
        }

        fn do_search(&self, _dependency: &DependencyInfo) -> Option<ProjectCoordinate> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.lock().unwrap().clone()
        }
    }

    fn jar() -> DependencyInfo {
        let path: PathBuf = std::env::temp_dir().join("example.jar");
        DependencyInfo::new(path, DependencyType::Jar).unwrap()
    }

    fn pc(version: &str) -> ProjectCoordinate {
        ProjectCoordinate::new("org.example", "example", version)
    }

    #[test]
    fn test_manual_mapping_wins() {
        let provider = MappingProvider::new();
        provider.add_strategy(FixedStrategy::new(DependencyType::Jar, Some(pc("1.0.0"))));
        provider.set_manual_mapping(jar(), pc("2.0.0"));

        assert_eq!(provider.search_for_project_coordinate(&jar()), Some(pc("2.0.0")));

        provider.remove_manual_mapping(&jar());
        assert_eq!(provider.search_for_project_coordinate(&jar()), Some(pc("1.0.0")));
    }

    #[test]
    fn test_first_strategy_with_result_wins() {
        let provider = MappingProvider::new();
        let empty = FixedStrategy::new(DependencyType::Jar, None);
        let first = FixedStrategy::new(DependencyType::Jar, Some(pc("1.0.0")));
        let second = FixedStrategy::new(DependencyType::Jar, Some(pc("3.0.0")));
        let strategies: Vec<Arc<dyn ProjectCoordinateResolver>> =
            vec![empty.clone(), first.clone(), second.clone()];
        provider.set_strategies(strategies);

        assert_eq!(provider.search_for_project_coordinate(&jar()), Some(pc("1.0.0")));
        assert_eq!(empty.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_inapplicable_strategy_is_skipped() {
        let provider = MappingProvider::new();
        let jre_only = FixedStrategy::new(DependencyType::Jre, Some(pc("1.0.0")));
        provider.add_strategy(jre_only.clone());

        assert!(!provider.is_applicable(DependencyType::Jar));
        assert_eq!(provider.search_for_project_coordinate(&jar()), None);
        assert_eq!(jre_only.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_results_are_cached() {
        let provider = MappingProvider::new();
        let strategy = FixedStrategy::new(DependencyType::Jar, Some(pc("1.0.0")));
        provider.add_strategy(strategy.clone());

        provider.search_for_project_coordinate(&jar());
        provider.search_for_project_coordinate(&jar());

        assert_eq!(strategy.calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.miss_count(), 1);
        assert_eq!(provider.hit_count(), 1);
    }

    #[test]
    fn test_changing_strategies_invalidates_cache() {
        let provider = MappingProvider::new();
        provider.add_strategy(FixedStrategy::new(DependencyType::Jar, None));
        assert_eq!(provider.search_for_project_coordinate(&jar()), None);

        let replacement: Arc<dyn ProjectCoordinateResolver> =
            FixedStrategy::new(DependencyType::Jar, Some(pc("1.0.0")));
        provider.set_strategies(vec![replacement]);
        assert_eq!(provider.search_for_project_coordinate(&jar()), Some(pc("1.0.0")));
    }

    #[test]
    fn test_miss_is_retried_once_strategy_can_answer() {
        let provider = MappingProvider::new();
        let strategy = FixedStrategy::new(DependencyType::Jar, None);
        provider.add_strategy(strategy.clone());
        assert_eq!(provider.search_for_project_coordinate(&jar()), None);

        strategy.answer(Some(pc("1.0.0")));
        assert_eq!(provider.search_for_project_coordinate(&jar()), Some(pc("1.0.0")));
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalidate_cache_forgets_resolved_coordinates() {
        let provider = MappingProvider::new();
        let strategy = FixedStrategy::new(DependencyType::Jar, Some(pc("1.0.0")));
        provider.add_strategy(strategy.clone());
        assert_eq!(provider.search_for_project_coordinate(&jar()), Some(pc("1.0.0")));

        strategy.answer(Some(pc("2.0.0")));
        assert_eq!(provider.search_for_project_coordinate(&jar()), Some(pc("1.0.0")));
        provider.invalidate_cache();
        assert_eq!(provider.search_for_project_coordinate(&jar()), Some(pc("2.0.0")));
    }
}
