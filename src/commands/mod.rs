use crate::cli::PlanArgs;
use crate::config::{self, PlanFile};
use anyhow::Result;
use declarative::{ResourceTypeRegistry, StateSnapshot};

pub mod compile;
pub mod levels;
pub mod plan;

/// A plan file with its registry and prior state, ready to declare
pub struct Loaded {
    pub plan: PlanFile,
    pub registry: ResourceTypeRegistry,
    pub state: StateSnapshot,
}

impl Loaded {
    pub fn from_args(args: &PlanArgs) -> Result<Self> {
        let plan = PlanFile::load(&args.plan)?;
        let registry = plan.registry();
        let state = config::load_state(args.state.as_deref())?;
        log::debug!(
            "Loaded {} resources of {} types, {} tracked",
            plan.resources.len(),
            plan.types.len(),
            state.len()
        );
        Ok(Self {
            plan,
            registry,
            state,
        })
    }
}
