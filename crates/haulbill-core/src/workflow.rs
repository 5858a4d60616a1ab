//! # Workflow Pipeline
//!
//! Ordered business-rule steps run around entity persistence.
//!
//! ## Execution Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Pipeline<BusinessContext<TruckTicket>>                                 │
//! │                                                                         │
//! │  stage        run_order   step                          should_run     │
//! │  ───────────  ─────────   ────────────────────────────  ────────────   │
//! │  Validation       0       validate-volumes              always         │
//! │  PreSave         10       merge-concurrent-attachments  on conflict    │
//! │  PreSave         20       correct-attachment-types      always         │
//! │                                                                         │
//! │  run(PreSave, &mut ctx):                                                │
//! │    for step in steps where stage == PreSave, by run_order:              │
//! │      if (step.should_run)(&ctx) { (step.apply)(&mut ctx)? }             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Steps are plain data (`fn` pointers plus ordering), so the order of a
//! pipeline is visible in one place.

use crate::error::CoreResult;

/// When a step runs relative to persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    PreValidation,
    Validation,
    PreSave,
    PostSave,
}

impl Stage {
    /// Stages that run before the entity is written.
    pub const BEFORE_SAVE: [Stage; 3] = [Stage::PreValidation, Stage::Validation, Stage::PreSave];
}

/// The persistence operation that triggered the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

/// The entity being written together with its stored predecessor.
#[derive(Debug, Clone)]
pub struct BusinessContext<T> {
    pub target: T,
    /// Stored version; `None` on insert.
    pub original: Option<T>,
    pub operation: Operation,
}

impl<T> BusinessContext<T> {
    pub fn insert(target: T) -> Self {
        BusinessContext {
            target,
            original: None,
            operation: Operation::Insert,
        }
    }

    pub fn update(original: T, target: T) -> Self {
        BusinessContext {
            target,
            original: Some(original),
            operation: Operation::Update,
        }
    }
}

/// One business rule.
pub struct WorkflowStep<C> {
    pub name: &'static str,
    pub stage: Stage,
    pub run_order: i32,
    pub should_run: fn(&C) -> bool,
    pub apply: fn(&mut C) -> CoreResult<()>,
}

impl<C> Clone for WorkflowStep<C> {
    fn clone(&self) -> Self {
        WorkflowStep {
            name: self.name,
            stage: self.stage,
            run_order: self.run_order,
            should_run: self.should_run,
            apply: self.apply,
        }
    }
}

impl<C> std::fmt::Debug for WorkflowStep<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowStep")
            .field("name", &self.name)
            .field("stage", &self.stage)
            .field("run_order", &self.run_order)
            .finish()
    }
}

/// `should_run` for steps that always apply.
pub fn always<C>(_: &C) -> bool {
    true
}

/// An ordered list of steps with a single driver.
#[derive(Debug, Clone)]
pub struct Pipeline<C> {
    steps: Vec<WorkflowStep<C>>,
}

impl<C> Default for Pipeline<C> {
    fn default() -> Self {
        Pipeline { steps: Vec::new() }
    }
}

impl<C> Pipeline<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a step, keeping steps sorted by stage then run order. Steps with
    /// equal order keep insertion order.
    pub fn with_step(mut self, step: WorkflowStep<C>) -> Self {
        self.steps.push(step);
        self.steps.sort_by_key(|s| (s.stage, s.run_order));
        self
    }

    pub fn steps(&self) -> &[WorkflowStep<C>] {
        &self.steps
    }

    /// Runs every applicable step of `stage`; returns the names of the steps
    /// that ran. Stops at the first failing step.
    pub fn run(&self, stage: Stage, ctx: &mut C) -> CoreResult<Vec<&'static str>> {
        let mut ran = Vec::new();
        for step in self.steps.iter().filter(|s| s.stage == stage) {
            if (step.should_run)(ctx) {
                (step.apply)(ctx)?;
                ran.push(step.name);
            }
        }
        Ok(ran)
    }

    /// Runs several stages in the given order.
    pub fn run_stages(&self, stages: &[Stage], ctx: &mut C) -> CoreResult<Vec<&'static str>> {
        let mut ran = Vec::new();
        for stage in stages {
            ran.extend(self.run(*stage, ctx)?);
        }
        Ok(ran)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, ValidationError};

    fn push_a(ctx: &mut Vec<&'static str>) -> CoreResult<()> {
        ctx.push("a");
        Ok(())
    }

    fn push_b(ctx: &mut Vec<&'static str>) -> CoreResult<()> {
        ctx.push("b");
        Ok(())
    }

    fn fail(_: &mut Vec<&'static str>) -> CoreResult<()> {
        Err(CoreError::Validation(ValidationError::Required {
            field: "x".to_string(),
        }))
    }

    fn never(_: &Vec<&'static str>) -> bool {
        false
    }

    fn step(
        name: &'static str,
        stage: Stage,
        run_order: i32,
        apply: fn(&mut Vec<&'static str>) -> CoreResult<()>,
    ) -> WorkflowStep<Vec<&'static str>> {
        WorkflowStep {
            name,
            stage,
            run_order,
            should_run: always,
            apply,
        }
    }

    #[test]
    fn test_steps_run_in_order_within_stage() {
        let pipeline = Pipeline::new()
            .with_step(step("b", Stage::PreSave, 20, push_b))
            .with_step(step("a", Stage::PreSave, 10, push_a))
            .with_step(step("post", Stage::PostSave, 0, push_a));

        let mut ctx = Vec::new();
        let ran = pipeline.run(Stage::PreSave, &mut ctx).unwrap();
        assert_eq!(ran, vec!["a", "b"]);
        assert_eq!(ctx, vec!["a", "b"]);
    }

    #[test]
    fn test_should_run_gates_step() {
        let mut gated = step("a", Stage::Validation, 0, push_a);
        gated.should_run = never;
        let pipeline = Pipeline::new().with_step(gated);

        let mut ctx = Vec::new();
        assert!(pipeline.run(Stage::Validation, &mut ctx).unwrap().is_empty());
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_failure_stops_pipeline() {
        let pipeline = Pipeline::new()
            .with_step(step("fail", Stage::Validation, 0, fail))
            .with_step(step("a", Stage::PreSave, 0, push_a));

        let mut ctx = Vec::new();
        assert!(pipeline.run_stages(&Stage::BEFORE_SAVE, &mut ctx).is_err());
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_business_context_constructors() {
        let ctx = BusinessContext::update(1, 2);
        assert_eq!(ctx.operation, Operation::Update);
        assert_eq!(ctx.original, Some(1));
        assert_eq!(BusinessContext::insert(3).original, None);
    }
}
