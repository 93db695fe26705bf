use crate::runtime::contract::ExecutionUnit;
use anyhow::{anyhow, bail, Result};
use once_cell::sync::OnceCell;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds one execution unit per worker. Invoked once at worker spawn; a
/// build failure becomes that worker's terminal result instead of crashing
/// the pool.
pub trait UnitFactory<T>: Send + Sync + 'static {
    fn build(&self, worker_id: usize) -> Result<Box<dyn ExecutionUnit<T>>>;
}

impl<T, F> UnitFactory<T> for F
where
    F: Fn(usize) -> Result<Box<dyn ExecutionUnit<T>>> + Send + Sync + 'static,
{
    fn build(&self, worker_id: usize) -> Result<Box<dyn ExecutionUnit<T>>> {
        self(worker_id)
    }
}

/// External lookup contract for unit dependencies. Lifetime semantics
/// (singleton, scoped, transient) are owned entirely by the directory; the
/// engine only asks it to resolve, once per worker for delegated dependencies
/// and once per pool for shared ones.
pub trait ServiceDirectory: Send + Sync {
    fn resolve(&self, ty: TypeId) -> Option<Arc<dyn Any + Send + Sync>>;
}

/// Simple map-backed [`ServiceDirectory`] for callers that register concrete
/// instances up front.
#[derive(Default)]
pub struct StaticDirectory {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<D: Send + Sync + 'static>(mut self, value: D) -> Self {
        self.entries.insert(TypeId::of::<D>(), Arc::new(value));
        self
    }
}

impl ServiceDirectory for StaticDirectory {
    fn resolve(&self, ty: TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.entries.get(&ty).cloned()
    }
}

enum Tier {
    /// Explicitly supplied value; always wins.
    Override(Arc<dyn Any + Send + Sync>),
    /// Resolved once per pool instance and reused identically by every worker.
    Shared(OnceCell<Arc<dyn Any + Send + Sync>>),
    /// Resolved from the directory once per worker construction.
    Directory,
}

struct DependencySpec {
    ty: TypeId,
    name: &'static str,
    tier: Tier,
}

/// Declarative list of a unit's dependencies and how each one is resolved.
///
/// Precedence, validated when the plan is built: an explicit override always
/// wins, shared dependencies are resolved once per pool, and everything else
/// is delegated to the [`ServiceDirectory`]. Declaring the same dependency
/// type twice is a configuration error and aborts plan construction.
pub struct InjectionPlan {
    specs: Vec<DependencySpec>,
    directory: Arc<dyn ServiceDirectory>,
}

impl std::fmt::Debug for InjectionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectionPlan")
            .field(
                "specs",
                &self.specs.iter().map(|spec| spec.name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl InjectionPlan {
    pub fn builder(directory: Arc<dyn ServiceDirectory>) -> InjectionPlanBuilder {
        InjectionPlanBuilder {
            specs: Vec::new(),
            directory,
        }
    }

    /// Resolves the full dependency set for one worker. A dependency the
    /// directory cannot supply fails the resolution; the caller records the
    /// failure as the worker's terminal result.
    pub fn resolve_for_worker(&self) -> Result<ResolvedDeps> {
        let mut entries = HashMap::with_capacity(self.specs.len());
        for spec in &self.specs {
            let value = match &spec.tier {
                Tier::Override(value) => value.clone(),
                Tier::Shared(cell) => cell
                    .get_or_try_init(|| {
                        self.directory.resolve(spec.ty).ok_or_else(|| {
                            anyhow!("shared dependency {} is not resolvable", spec.name)
                        })
                    })?
                    .clone(),
                Tier::Directory => self
                    .directory
                    .resolve(spec.ty)
                    .ok_or_else(|| anyhow!("dependency {} is not resolvable", spec.name))?,
            };
            entries.insert(spec.ty, value);
        }
        Ok(ResolvedDeps { entries })
    }
}

pub struct InjectionPlanBuilder {
    specs: Vec<DependencySpec>,
    directory: Arc<dyn ServiceDirectory>,
}

impl InjectionPlanBuilder {
    /// Declares a dependency satisfied by this exact value for every worker.
    pub fn with_override<D: Send + Sync + 'static>(mut self, value: D) -> Self {
        self.specs.push(DependencySpec {
            ty: TypeId::of::<D>(),
            name: type_name::<D>(),
            tier: Tier::Override(Arc::new(value)),
        });
        self
    }

    /// Declares a dependency resolved from the directory once per pool
    /// instance and shared by all workers.
    pub fn with_shared<D: Send + Sync + 'static>(mut self) -> Self {
        self.specs.push(DependencySpec {
            ty: TypeId::of::<D>(),
            name: type_name::<D>(),
            tier: Tier::Shared(OnceCell::new()),
        });
        self
    }

    /// Declares a dependency delegated to the directory per worker.
    pub fn from_directory<D: Send + Sync + 'static>(mut self) -> Self {
        self.specs.push(DependencySpec {
            ty: TypeId::of::<D>(),
            name: type_name::<D>(),
            tier: Tier::Directory,
        });
        self
    }

    pub fn build(self) -> Result<InjectionPlan> {
        for (index, spec) in self.specs.iter().enumerate() {
            if self.specs[..index].iter().any(|other| other.ty == spec.ty) {
                bail!("dependency {} declared more than once", spec.name);
            }
        }
        Ok(InjectionPlan {
            specs: self.specs,
            directory: self.directory,
        })
    }
}

/// Dependency map handed to an injected constructor, one per worker.
pub struct ResolvedDeps {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for ResolvedDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedDeps")
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ResolvedDeps {
    pub fn get<D: Send + Sync + 'static>(&self) -> Result<Arc<D>> {
        let entry = self
            .entries
            .get(&TypeId::of::<D>())
            .ok_or_else(|| anyhow!("dependency {} was not declared", type_name::<D>()))?;
        entry
            .clone()
            .downcast::<D>()
            .map_err(|_| anyhow!("dependency {} has an unexpected type", type_name::<D>()))
    }
}

/// [`UnitFactory`] that resolves an [`InjectionPlan`] per worker and hands the
/// dependency map to a typed constructor.
pub struct InjectedFactory<T> {
    plan: InjectionPlan,
    construct: Arc<dyn Fn(usize, &ResolvedDeps) -> Result<Box<dyn ExecutionUnit<T>>> + Send + Sync>,
}

impl<T> InjectedFactory<T> {
    pub fn new(
        plan: InjectionPlan,
        construct: impl Fn(usize, &ResolvedDeps) -> Result<Box<dyn ExecutionUnit<T>>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            plan,
            construct: Arc::new(construct),
        }
    }
}

impl<T: Send + Sync + 'static> UnitFactory<T> for InjectedFactory<T> {
    fn build(&self, worker_id: usize) -> Result<Box<dyn ExecutionUnit<T>>> {
        let deps = self.plan.resolve_for_worker()?;
        (self.construct)(worker_id, &deps)
    }
}
