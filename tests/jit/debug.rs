//! Debugger registration of compiled blocks.

use jish::codegen::{self, TrampolineCache, WritableBlock};
use jish::debug::{build_object, describe, DebugRegistry, SymbolKind};
use jish::Engine;

use crate::{parse, quiet_engine};

#[test]
fn registration_lives_as_long_as_the_closure() {
    let registry = DebugRegistry::global();
    let before = registry.registered();

    let closure = Engine::default().compile(&parse("ls | wc")).expect("compile");
    assert_eq!(registry.registered(), before + 1);
    let clone = closure.clone();
    drop(closure);
    assert_eq!(registry.registered(), before + 1);
    drop(clone);
    assert_eq!(registry.registered(), before);

    let _quiet = quiet_engine().compile(&parse("ls")).expect("compile");
    assert_eq!(registry.registered(), before);
}

#[test]
fn symbols_cover_steps_and_literals() {
    let engine = quiet_engine();
    let mut program = engine.lower(&parse("true && echo hi")).expect("lower");
    let assembly = codegen::emit(&mut program).expect("emit");
    let block = WritableBlock::allocate(codegen::image_len(&assembly, &program.tags)).expect("map");
    let base = block.base();
    let mut trampolines = TrampolineCache::new();
    let image = codegen::link(assembly, &program.tags, base, &mut trampolines).expect("link");

    let described = describe(&image, base);
    assert_eq!(described.code_address, base as u64);
    assert_eq!(described.code_size, image.code_len as u64);

    let functions: Vec<_> = described
        .symbols
        .iter()
        .filter(|symbol| symbol.kind == SymbolKind::Function)
        .collect();
    assert_eq!(functions.len(), program.steps.len());
    assert_eq!(
        functions
            .iter()
            .filter(|symbol| symbol.name == "jish_entry")
            .count(),
        1
    );
    for symbol in &described.symbols {
        let end = symbol.address + symbol.size;
        match symbol.kind {
            SymbolKind::Function => assert!(end <= described.data_address, "{symbol:?}"),
            SymbolKind::Object => {
                assert!(symbol.name.starts_with("jish_str_"), "{symbol:?}");
                assert!(symbol.address >= described.data_address, "{symbol:?}");
            }
        }
    }
    let literals = described
        .symbols
        .iter()
        .filter(|symbol| symbol.kind == SymbolKind::Object)
        .count();
    assert_eq!(literals, program.tags.literals().count());

    let object = build_object(&described);
    assert_eq!(&object[..4], b"\x7FELF");
}
