//! Integration tests for program loading and verification.

use std::sync::Arc;

use kobserve::context::ProbeContext;
use kobserve::program::{self, LoadError, ProbeProgram, ProgramObject};
use kobserve::record::EVENT_RECORD_SIZE;

struct Nop;

impl ProbeProgram for Nop {
    fn run(&self, _ctx: &ProbeContext) -> u32 {
        0
    }
}

// =============================================================================
// Verification Tests
// =============================================================================

#[test]
fn test_load_valid_object() {
    let object = ProgramObject::new("valid")
        .declares_emit(EVENT_RECORD_SIZE)
        .entry("main", Arc::new(Nop));
    assert!(program::load(object).is_ok());
}

#[test]
fn test_load_rejects_empty_object() {
    let result = program::load(ProgramObject::new("empty"));
    assert!(matches!(result, Err(LoadError::NoEntryPoints(_))));
}

#[test]
fn test_load_rejects_duplicate_entries() {
    let object = ProgramObject::new("dup")
        .entry("main", Arc::new(Nop))
        .entry("main", Arc::new(Nop));
    assert!(matches!(
        program::load(object),
        Err(LoadError::DuplicateEntry { .. })
    ));
}

#[test]
fn test_load_rejects_emit_size_mismatch() {
    let object = ProgramObject::new("wrong_size")
        .declares_emit(EVENT_RECORD_SIZE + 4)
        .entry("main", Arc::new(Nop));
    let result = program::load(object);
    match result {
        Err(LoadError::EmitSizeMismatch { declared, expected, .. }) => {
            assert_eq!(declared, EVENT_RECORD_SIZE + 4);
            assert_eq!(expected, EVENT_RECORD_SIZE);
        }
        other => panic!("expected emit size mismatch, got {:?}", other),
    }
}

// =============================================================================
// Handler Resolution Tests
// =============================================================================

#[test]
fn test_handler_resolution() {
    let object = program::load(ProgramObject::new("resolve").entry("main", Arc::new(Nop))).unwrap();

    let handler = program::handler(object, "main").unwrap();
    assert!(program::handler_exists(handler));

    let ctx = ProbeContext::new(0);
    assert_eq!(program::run_handler(handler, &ctx), Some(0));
}

#[test]
fn test_unknown_entry_fails() {
    let object = program::load(ProgramObject::new("lookup").entry("main", Arc::new(Nop))).unwrap();
    assert!(matches!(
        program::handler(object, "missing"),
        Err(LoadError::EntryNotFound { .. })
    ));
}

#[test]
fn test_unload_keeps_resolved_handlers_valid() {
    let object = program::load(ProgramObject::new("unload").entry("main", Arc::new(Nop))).unwrap();
    let handler = program::handler(object, "main").unwrap();

    program::unload(object).unwrap();
    assert!(matches!(
        program::handler(object, "main"),
        Err(LoadError::ObjectNotFound(_))
    ));

    // The handler table keeps the program alive.
    let ctx = ProbeContext::new(0);
    assert_eq!(program::run_handler(handler, &ctx), Some(0));

    // A second unload reports the missing object.
    assert!(program::unload(object).is_err());
}
