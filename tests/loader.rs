mod common;

use archload::{
    CallError, Error, Loader, LoaderError, ScopeError, ERROR_TAG, STRING_FUNCTION,
};
use common::{fixture_library, library_entry, write_archive};
use sha2::{Digest, Sha256};
use std::fs;
use std::thread;
use tempfile::TempDir;

fn loader(scratch: &TempDir) -> Loader {
    Loader::builder().scratch_dir(scratch.path()).build()
}

fn apply(instance: &archload::Instance, input: &str) -> String {
    instance
        .as_string_function()
        .expect("class implements StringFunction")
        .apply(input)
        .unwrap()
}

fn load_failure(err: Error) -> ScopeError {
    assert!(err.to_string().starts_with(ERROR_TAG), "untagged error: {err}");
    match err {
        Error::Loader(LoaderError::LoadFailed { source, .. }) => source,
        other => panic!("expected LoadFailed, got {other:?}"),
    }
}

#[test]
fn test_jar_with_nested_library() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let jar = write_archive(work.path(), "x.jar", "lib", None);

    let instance = loader(&scratch).get(&jar, "Teste").unwrap();
    assert_eq!(instance.class_name(), "Teste");
    assert_eq!(instance.archive(), jar.as_path());
    assert_eq!(apply(&instance, "ok"), "OK");
}

#[test]
fn test_zip_with_root_library() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let zip = write_archive(work.path(), "y.zip", "", None);

    let instance = loader(&scratch).get(&zip, "Teste").unwrap();
    assert_eq!(apply(&instance, "y"), "Y");
}

#[test]
fn test_default_loader_free_function() {
    let work = TempDir::new().unwrap();
    let jar = write_archive(work.path(), "x.jar", "lib", None);

    let instance = archload::get(&jar, "Teste").unwrap();
    assert_eq!(apply(&instance, "ok"), "OK");
}

#[test]
fn test_archive_only_uses_descriptor() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let archive = write_archive(work.path(), "teste.zip", "", Some("Teste"));

    let instance = loader(&scratch).get_by_descriptor(&archive).unwrap();
    assert_eq!(instance.class_name(), "Teste");
    assert_eq!(apply(&instance, "teste"), "TESTE");
}

#[test]
fn test_descriptor_is_trimmed() {
    let work = TempDir::new().unwrap();
    let archive = write_archive(work.path(), "teste.zip", "lib", Some("\u{feff}Teste\r\n"));

    let instance = archload::get_by_descriptor(&archive).unwrap();
    assert_eq!(apply(&instance, "teste"), "TESTE");
}

#[test]
fn test_descriptor_matches_direct_request() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let archive = write_archive(work.path(), "teste.zip", "", Some("fixtures.Counter"));
    let loader = loader(&scratch);

    let described = loader.get_by_descriptor(&archive).unwrap();
    let direct = loader.get(&archive, "fixtures.Counter").unwrap();
    assert_eq!(described.class_name(), direct.class_name());
    assert_eq!(apply(&described, ""), apply(&direct, ""));
}

#[test]
fn test_descriptor_naming_broken_class_fails() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let archive = write_archive(work.path(), "servico.zip", "", Some("fixtures.Failing"));

    let err = loader(&scratch).get_by_descriptor(&archive).unwrap_err();
    assert!(matches!(
        load_failure(err),
        ScopeError::Constructor { .. }
    ));
}

#[test]
fn test_class_not_in_archive() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let jar = write_archive(work.path(), "x.jar", "lib", None);

    let err = loader(&scratch).get(&jar, "com.exemplo.Teste").unwrap_err();
    assert!(err.to_string().contains("com.exemplo.Teste"));
    assert!(matches!(
        load_failure(err),
        ScopeError::ClassNotFound(class) if class == "com.exemplo.Teste"
    ));
}

#[test]
fn test_class_without_default_constructor() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let jar = write_archive(work.path(), "x.jar", "lib", None);

    let err = loader(&scratch).get(&jar, "fixtures.Abstract").unwrap_err();
    assert!(matches!(
        load_failure(err),
        ScopeError::NoDefaultConstructor(class) if class == "fixtures.Abstract"
    ));
}

#[test]
fn test_constructor_error_is_wrapped() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let jar = write_archive(work.path(), "x.jar", "lib", None);

    let err = loader(&scratch).get(&jar, "fixtures.Failing").unwrap_err();
    match load_failure(err) {
        ScopeError::Constructor { class, message } => {
            assert_eq!(class, "fixtures.Failing");
            assert_eq!(message, "refusing to construct");
        }
        other => panic!("expected constructor failure, got {other:?}"),
    }
}

#[test]
fn test_constructor_panic_is_wrapped() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let jar = write_archive(work.path(), "x.jar", "lib", None);

    let err = loader(&scratch).get(&jar, "fixtures.Panicking").unwrap_err();
    match load_failure(err) {
        ScopeError::Constructor { message, .. } => {
            assert!(message.contains("constructor panicked on purpose"));
        }
        other => panic!("expected constructor failure, got {other:?}"),
    }
}

#[test]
fn test_initializer_failure_is_wrapped() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let jar = write_archive(work.path(), "x.jar", "lib", None);

    let err = loader(&scratch).get(&jar, "fixtures.BrokenInit").unwrap_err();
    match load_failure(err) {
        ScopeError::Initializer { class, message } => {
            assert_eq!(class, "fixtures.BrokenInit");
            assert_eq!(message, "static state unavailable");
        }
        other => panic!("expected initializer failure, got {other:?}"),
    }
}

#[test]
fn test_each_call_gets_fresh_statics() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let jar = write_archive(work.path(), "x.jar", "lib", None);
    let loader = loader(&scratch);

    let first = loader.get(&jar, "fixtures.Counter").unwrap();
    let second = loader.get(&jar, "fixtures.Counter").unwrap();
    assert_eq!(apply(&first, ""), "1:1");
    assert_eq!(apply(&second, ""), "1:1");
    assert_ne!(first.scope().id(), second.scope().id());
}

#[test]
fn test_shared_scope_initializes_once() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let jar = write_archive(work.path(), "x.jar", "lib", None);

    let scope = loader(&scratch).open_scope(&jar).unwrap();
    let first = scope.instantiate("fixtures.Counter").unwrap();
    assert_eq!(apply(&first, ""), "1:1");

    let second = scope.instantiate("fixtures.Counter").unwrap();
    assert_eq!(apply(&second, ""), "1:2");
    assert_eq!(apply(&first, ""), "1:2");
}

#[test]
fn test_concurrent_calls_are_isolated() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let jar = write_archive(work.path(), "x.jar", "lib", None);
    let loader = &loader(&scratch);
    let jar = &jar;

    thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(move || {
                    let instance = loader.get(jar, "fixtures.Counter").unwrap();
                    apply(&instance, "")
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), "1:1");
        }
    });
}

#[test]
fn test_instance_can_move_between_threads() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let jar = write_archive(work.path(), "x.jar", "lib", None);

    let instance = loader(&scratch).get(&jar, "Teste").unwrap();
    let output = thread::spawn(move || apply(&instance, "movido"))
        .join()
        .unwrap();
    assert_eq!(output, "MOVIDO");
}

#[test]
fn test_scope_released_with_last_instance() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let jar = write_archive(work.path(), "x.jar", "lib", None);

    let instance = loader(&scratch).get(&jar, "Teste").unwrap();
    let dir = instance.scope().dir().to_path_buf();
    assert!(dir.join(library_entry("lib")).is_file());

    drop(instance);
    assert!(!dir.exists());
    assert!(fs::read_dir(scratch.path()).unwrap().next().is_none());
}

#[test]
fn test_instance_keeps_scope_alive() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let jar = write_archive(work.path(), "x.jar", "lib", None);

    let scope = loader(&scratch).open_scope(&jar).unwrap();
    let dir = scope.dir().to_path_buf();
    let instance = scope.instantiate("Teste").unwrap();
    drop(scope);

    assert!(dir.exists());
    assert_eq!(apply(&instance, "vivo"), "VIVO");

    drop(instance);
    assert!(!dir.exists());
}

#[test]
fn test_with_instance_releases_scope() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let jar = write_archive(work.path(), "x.jar", "lib", None);

    let output = loader(&scratch)
        .with_instance(&jar, "Teste", |instance| apply(instance, "escopo"))
        .unwrap();
    assert_eq!(output, "ESCOPO");
    assert!(fs::read_dir(scratch.path()).unwrap().next().is_none());
}

#[test]
fn test_class_without_known_interface() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let jar = write_archive(work.path(), "x.jar", "lib", None);

    let instance = loader(&scratch).get(&jar, "fixtures.Opaque").unwrap();
    assert!(!instance.implements(STRING_FUNCTION));
    assert!(instance.as_string_function().is_none());
}

#[test]
fn test_string_function_handles_unicode() {
    let work = TempDir::new().unwrap();
    let jar = write_archive(work.path(), "x.jar", "lib", None);

    let instance = archload::get(&jar, "Teste").unwrap();
    assert!(instance.implements(STRING_FUNCTION));
    let function = instance.as_string_function().unwrap();
    assert_eq!(function.apply("serviço").unwrap(), "SERVIÇO");
    assert_eq!(function.apply("").unwrap(), "");
}

#[test]
fn test_call_error_display() {
    let err = CallError::Failed("boom".to_string());
    assert_eq!(err.to_string(), "Call failed: boom");
}

#[test]
fn test_inspect_lists_classes() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let archive = write_archive(work.path(), "teste.zip", "lib", Some("Teste"));

    let report = loader(&scratch).inspect(&archive).unwrap();
    assert_eq!(report.descriptor.as_deref(), Some("Teste"));

    assert_eq!(report.libraries.len(), 1);
    let library = &report.libraries[0];
    assert_eq!(library.virtual_path, library_entry("lib"));
    let bytes = fs::read(fixture_library()).unwrap();
    assert_eq!(library.size, bytes.len() as u64);
    assert_eq!(library.sha256, hex::encode(Sha256::digest(&bytes)));

    let teste = report.classes.iter().find(|c| c.name == "Teste").unwrap();
    assert!(teste.default_constructor);
    assert_eq!(teste.interfaces, vec!["archload.StringFunction".to_string()]);
    assert_eq!(teste.library, library_entry("lib"));

    let abstract_class = report
        .classes
        .iter()
        .find(|c| c.name == "fixtures.Abstract")
        .unwrap();
    assert!(!abstract_class.default_constructor);
    assert!(abstract_class.interfaces.is_empty());

    assert_eq!(report.classes.len(), 7);
    assert!(report.to_string().contains("[no default constructor]"));

    // Inspecting instantiates nothing and leaves no scope behind
    assert!(fs::read_dir(scratch.path()).unwrap().next().is_none());
}
