use std::collections::HashMap;
use std::sync::Arc;

use framery_blob::MemoryBlobStore;
use framery_core::{
    InsertSpec, IoSet, IoTag, MemoryJobStore, ProcessorRegistry, StackOverlay,
};
use framery_pipeline::processors::{default_processors, ids};
use framery_pipeline::{PipelineError, Providers, Stack, StackLibrary, StackRunner, StackStep};

fn registry() -> Arc<ProcessorRegistry> {
    let mut registry = ProcessorRegistry::new();
    registry.register_all(default_processors(
        Arc::new(MemoryJobStore::new()),
        Arc::new(MemoryBlobStore::new()),
        Providers::default(),
    ));
    Arc::new(registry)
}

fn video_io() -> IoSet {
    IoSet::from([IoTag::Video])
}

/// A1. Every built-in stack validates from its own required inputs.
#[test]
fn built_in_stacks_validate_from_required_inputs() {
    let runner = StackRunner::new(registry());
    let library = StackLibrary::with_defaults();

    for id in library.ids() {
        let stack = library.get(&id).unwrap();
        let required: IoSet = runner.required_inputs(&stack).unwrap().into_iter().collect();
        let report = runner.validate(&stack, &required);
        assert!(report.valid, "stack {id} invalid: {:?}", report.error);
    }
}

/// A2. Swapping IO-compatible processors preserves validity.
#[test]
fn swappable_pairs_preserve_validity() {
    let registry = registry();
    let runner = StackRunner::new(registry.clone());
    let library = StackLibrary::with_defaults();
    let stack = library.get("product-frames").unwrap();

    let ids: Vec<String> = registry.ids();
    for a in &ids {
        for b in &ids {
            if a == b || !registry.are_swappable(a, b) {
                continue;
            }
            let swapped = Stack::new(
                "swapped",
                "swapped",
                stack
                    .steps
                    .iter()
                    .map(|step| {
                        let mut step = step.clone();
                        if &step.processor_id == a {
                            step.processor_id = b.clone();
                        }
                        step
                    })
                    .collect(),
            );
            let required: IoSet = runner
                .required_inputs(&swapped)
                .unwrap()
                .into_iter()
                .collect();
            assert!(
                runner.validate(&swapped, &required).valid,
                "swapping {a} -> {b} broke the stack"
            );
        }
    }
}

/// A3. The capability set grows monotonically along the stack.
#[test]
fn available_io_is_monotonic() {
    let runner = StackRunner::new(registry());
    let library = StackLibrary::with_defaults();
    let stack = library.get("product-frames").unwrap();

    let mut previous = IoSet::new();
    for index in 0..stack.steps.len() {
        let available = runner.available_io(&stack, index).unwrap();
        assert!(
            available.is_superset(&previous),
            "capability set shrank at step {index}"
        );
        previous = available;
    }
}

/// S2. Swapping photoroom for claid keeps position and drops the original.
#[test]
fn swap_replaces_processor_in_place() {
    let runner = StackRunner::new(registry());
    let stack = StackLibrary::with_defaults().get("product-frames").unwrap();

    let overlay = StackOverlay {
        processor_swaps: HashMap::from([(
            ids::PHOTOROOM_BG_REMOVE.to_string(),
            ids::CLAID_BG_REMOVE.to_string(),
        )]),
        ..StackOverlay::default()
    };

    let original_index = stack
        .step_ids()
        .iter()
        .position(|id| *id == ids::PHOTOROOM_BG_REMOVE)
        .unwrap();

    let configured = runner.apply_config(&stack, &overlay).unwrap();
    let step_ids = configured.step_ids();
    assert_eq!(step_ids[original_index], ids::CLAID_BG_REMOVE);
    assert!(!step_ids.contains(&ids::PHOTOROOM_BG_REMOVE));
    assert!(runner.validate(&configured, &video_io()).valid);
}

/// Swaps between IO-incompatible processors are rejected.
#[test]
fn incompatible_swaps_are_rejected() {
    let runner = StackRunner::new(registry());
    let swaps = HashMap::from([(
        ids::DOWNLOAD.to_string(),
        ids::SCORE_FRAMES.to_string(),
    )]);
    let err = runner.validate_swaps(&swaps).unwrap_err();
    assert!(matches!(err, PipelineError::IncompatibleSwap { .. }));

    let swaps = HashMap::from([("nope".to_string(), ids::DOWNLOAD.to_string())]);
    let err = runner.validate_swaps(&swaps).unwrap_err();
    assert!(matches!(err, PipelineError::UnknownProcessor(_)));
}

/// S3. Insert lands right after its anchor.
#[test]
fn insert_after_anchor() {
    let runner = StackRunner::new(registry());
    let stack = StackLibrary::with_defaults().get("product-frames").unwrap();

    let overlay = StackOverlay {
        insert_processors: vec![InsertSpec::after(ids::EXTRACT_FRAMES, ids::ROTATE_IMAGE)],
        ..StackOverlay::default()
    };

    let configured = runner.apply_config(&stack, &overlay).unwrap();
    assert_eq!(configured.steps.len(), stack.steps.len() + 1);

    let step_ids = configured.step_ids();
    let extract = step_ids
        .iter()
        .position(|id| *id == ids::EXTRACT_FRAMES)
        .unwrap();
    let rotate = step_ids
        .iter()
        .position(|id| *id == ids::ROTATE_IMAGE)
        .unwrap();
    assert_eq!(rotate, extract + 1);
    assert!(runner.validate(&configured, &video_io()).valid);
}

/// Repeated inserts at the same anchor keep their list order.
#[test]
fn insert_ties_break_by_list_order() {
    let runner = StackRunner::new(registry());
    let stack = Stack::new(
        "base",
        "base",
        vec![
            StackStep::new(ids::DOWNLOAD),
            StackStep::new(ids::EXTRACT_FRAMES),
        ],
    );

    let overlay = StackOverlay {
        insert_processors: vec![
            InsertSpec::after(ids::EXTRACT_FRAMES, ids::ROTATE_IMAGE),
            InsertSpec::after(ids::EXTRACT_FRAMES, ids::PHOTOROOM_BG_REMOVE),
            InsertSpec::before(ids::DOWNLOAD, ids::ROTATE_IMAGE),
        ],
        ..StackOverlay::default()
    };

    let configured = runner.apply_config(&stack, &overlay).unwrap();
    assert_eq!(
        configured.step_ids(),
        vec![
            ids::ROTATE_IMAGE,
            ids::DOWNLOAD,
            ids::EXTRACT_FRAMES,
            ids::ROTATE_IMAGE,
            ids::PHOTOROOM_BG_REMOVE,
        ]
    );
}

/// Unknown anchors and processors fail configuration.
#[test]
fn insert_with_unknown_anchor_fails() {
    let runner = StackRunner::new(registry());
    let stack = StackLibrary::with_defaults().get("minimal").unwrap();

    let overlay = StackOverlay {
        insert_processors: vec![InsertSpec::after("nope", ids::ROTATE_IMAGE)],
        ..StackOverlay::default()
    };
    let err = runner.apply_config(&stack, &overlay).unwrap_err();
    assert!(matches!(err, PipelineError::UnknownAnchor(_)));

    let overlay = StackOverlay {
        insert_processors: vec![InsertSpec::after(ids::DOWNLOAD, "not-registered")],
        ..StackOverlay::default()
    };
    let err = runner.apply_config(&stack, &overlay).unwrap_err();
    assert!(matches!(err, PipelineError::UnknownProcessor(_)));
}

/// S4. Missing capability is reported with processor, tag and index.
#[test]
fn validation_reports_missing_tag() {
    let runner = StackRunner::new(registry());
    let stack = Stack::new(
        "bad",
        "bad",
        vec![
            StackStep::new(ids::DOWNLOAD),
            StackStep::new(ids::SCORE_FRAMES),
        ],
    );

    let report = runner.validate(&stack, &video_io());
    assert!(!report.valid);
    let error = report.error.unwrap();
    assert!(error.contains("requires 'images'"), "got: {error}");
    assert!(error.contains(ids::SCORE_FRAMES));
    assert!(error.contains("step 1"));
}

/// Required inputs are exactly the tags no earlier step produces.
#[test]
fn required_inputs_account_for_earlier_produces() {
    let runner = StackRunner::new(registry());
    let library = StackLibrary::with_defaults();

    let minimal = library.get("minimal").unwrap();
    assert_eq!(runner.required_inputs(&minimal).unwrap(), vec![IoTag::Video]);

    let tail = Stack::new(
        "tail",
        "tail",
        vec![
            StackStep::new(ids::SCORE_FRAMES),
            StackStep::new(ids::FILTER_BY_SCORE),
        ],
    );
    let required = runner.required_inputs(&tail).unwrap();
    assert!(required.contains(&IoTag::Images));
    assert!(required.contains(&IoTag::Frames));
    // frames.scores is produced by the first step.
    assert!(!required.contains(&IoTag::FrameScores));
}
