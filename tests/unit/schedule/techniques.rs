use super::*;

#[test]
fn ids_follow_registration_order() {
    let mut table = TechniqueTable::<u32>::new();
    assert!(table.is_empty());
    let opaque = table.register("opaque", |_| {});
    let blend = table.register("blend", |_| {});

    assert_eq!(opaque, TechniqueId(0));
    assert_eq!(blend, TechniqueId(1));
    assert_eq!(table.len(), 2);
    assert_eq!(table.name(blend), Some("blend"));
    assert_eq!(table.name(TechniqueId(2)), None);
    assert_eq!(table.id_of("opaque"), Some(opaque));
    assert_eq!(table.id_of("shadow"), None);
    assert_eq!(format!("{table:?}"), r#"["opaque", "blend"]"#);
}

#[test]
fn dispatch_calls_the_registered_handler() {
    let mut seen = Vec::new();
    {
        let mut table = TechniqueTable::new();
        let id = table.register("collect", |tasks: &[Task<u32>]| {
            seen.extend(tasks.iter().map(|t| t.data));
        });
        let tasks = [Task::new(0, id, 4), Task::new(0, id, 5)];
        table.dispatch(id, &tasks).unwrap();
        table.dispatch(id, &tasks[..1]).unwrap();
    }
    assert_eq!(seen, vec![4, 5, 4]);
}

#[test]
fn unknown_technique_is_an_execution_error() {
    let mut table = TechniqueTable::<u32>::default();
    table.register("only", |_| {});
    let err = table.dispatch(TechniqueId(3), &[]).unwrap_err();
    assert!(matches!(err, FrameplanError::Execution(_)));
    assert!(err.to_string().contains("technique 3"));
}
