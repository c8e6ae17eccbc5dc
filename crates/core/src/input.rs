//! Stage input assembly.
//!
//! A stage's input is a deterministic function of the run so far: the
//! original request plus the results of every earlier stage, in stage
//! order. On rework iterations the latest results of later stages are
//! attached as `feedback`, so the reworked stage can see why it is being
//! run again.

use crate::state::context::ProjectContext;
use pdca_protocol::stage_models::Stage;
use serde_json::{json, Map, Value};

/// Build the input document for `stage`.
pub fn build_stage_input(context: &ProjectContext, stage: Stage, instructions: &str) -> Value {
    let mut previous = Map::new();
    let mut feedback = Map::new();

    // BTreeMap iteration is already in stage order.
    for (result_stage, result) in &context.results {
        if *result_stage < stage {
            previous.insert(result_stage.to_string(), result.clone());
        } else if *result_stage > stage && context.iteration_count > 0 {
            feedback.insert(result_stage.to_string(), result.clone());
        }
    }

    let mut input = json!({
        "run_id": context.id.to_string(),
        "stage": stage,
        "original_request": context.original_request,
        "iteration": context.iteration_count,
        "previous_results": Value::Object(previous),
    });

    if let Some(object) = input.as_object_mut() {
        if !feedback.is_empty() {
            object.insert("feedback".to_string(), Value::Object(feedback));
        }
        if !instructions.trim().is_empty() {
            object.insert(
                "instructions".to_string(),
                Value::String(instructions.trim().to_string()),
            );
        }
    }

    input
}

/// [`build_stage_input`] serialized for the executor.
pub fn serialize_stage_input(context: &ProjectContext, stage: Stage, instructions: &str) -> String {
    build_stage_input(context, stage, instructions).to_string()
}
