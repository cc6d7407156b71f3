mod common;

use common::{migrated_engine, project_payload};
use reports_core::repo::lookup_repo::{list_lookup, LookupTable};
use reports_core::repo::project_repo::{
    ProjectListQuery, ProjectRepository, SqliteProjectRepository,
};
use reports_core::testing::acquire_scope;
use reports_core::{ProjectService, RepoError, ServiceError, ValidationError};

#[test]
fn save_and_get_project_roundtrip() {
    let db = migrated_engine();
    let scope = acquire_scope(&db.engine).unwrap();
    let service = ProjectService::for_session(scope.bind_session());

    let mut payload = project_payload();
    payload.address = Some("1 Main Street".to_string());
    let saved = service.save_project(&payload).unwrap();

    let loaded = service.get_project(saved.id).unwrap();
    assert_eq!(loaded.name, payload.name);
    assert_eq!(loaded.address.as_deref(), Some("1 Main Street"));
    assert_eq!(loaded.region_id_env, Some(1));
    assert_eq!(loaded.region_id_flnro, Some(4));
    assert!(loaded.is_active);
}

#[test]
fn update_project_persists_changes() {
    let db = migrated_engine();
    let scope = acquire_scope(&db.engine).unwrap();
    let service = ProjectService::for_session(scope.bind_session());

    let mut project = service.save_project(&project_payload()).unwrap();
    project.location = "Kamloops".to_string();
    project.proponent_id = 2;

    let updated = service.update_project(&project).unwrap();
    assert_eq!(updated.location, "Kamloops");
    assert_eq!(updated.proponent_id, 2);
}

#[test]
fn deactivated_projects_are_hidden_from_default_lists() {
    let db = migrated_engine();
    let scope = acquire_scope(&db.engine).unwrap();
    let service = ProjectService::for_session(scope.bind_session());

    let active = service.save_project(&project_payload()).unwrap();
    let retired = service.save_project(&project_payload()).unwrap();
    service.deactivate_project(retired.id).unwrap();

    let visible = service
        .list_projects(&ProjectListQuery::default())
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, active.id);

    let all = service
        .list_projects(&ProjectListQuery {
            include_inactive: true,
            ..ProjectListQuery::default()
        })
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[test]
fn list_projects_filters_by_proponent_and_paginates() {
    let db = migrated_engine();
    let scope = acquire_scope(&db.engine).unwrap();
    let service = ProjectService::for_session(scope.bind_session());

    for proponent_id in [1, 1, 1, 2] {
        let mut payload = project_payload();
        payload.proponent_id = proponent_id;
        service.save_project(&payload).unwrap();
    }

    let first_proponent = service
        .list_projects(&ProjectListQuery {
            proponent_id: Some(1),
            ..ProjectListQuery::default()
        })
        .unwrap();
    assert_eq!(first_proponent.len(), 3);

    let page = service
        .list_projects(&ProjectListQuery {
            limit: Some(2),
            offset: 3,
            ..ProjectListQuery::default()
        })
        .unwrap();
    assert_eq!(page.len(), 1);
}

#[test]
fn duplicate_project_name_is_a_conflict() {
    let db = migrated_engine();
    let scope = acquire_scope(&db.engine).unwrap();
    let service = ProjectService::for_session(scope.bind_session());

    let payload = project_payload();
    service.save_project(&payload).unwrap();

    let err = service.save_project(&payload).unwrap_err();
    assert!(matches!(err, ServiceError::Repo(RepoError::Conflict(_))));
}

#[test]
fn unknown_sub_sector_is_an_invalid_reference() {
    let db = migrated_engine();
    let scope = acquire_scope(&db.engine).unwrap();
    let repo = SqliteProjectRepository::new(scope.bind_session());

    let mut payload = project_payload();
    payload.sub_sector_id = 42;

    let err = repo.create_project(&payload).unwrap_err();
    assert!(matches!(err, RepoError::InvalidReference(_)));
}

#[test]
fn blank_fields_are_rejected_before_sql() {
    let db = migrated_engine();
    let scope = acquire_scope(&db.engine).unwrap();
    let repo = SqliteProjectRepository::new(scope.bind_session());

    let mut payload = project_payload();
    payload.description = "  ".to_string();

    let err = repo.create_project(&payload).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ValidationError::EmptyField("description"))
    ));
}

#[test]
fn missing_project_maps_to_not_found() {
    let db = migrated_engine();
    let scope = acquire_scope(&db.engine).unwrap();
    let service = ProjectService::for_session(scope.bind_session());

    assert!(matches!(
        service.get_project(404),
        Err(ServiceError::NotFound {
            entity: "project",
            id: 404
        })
    ));
    assert!(matches!(
        service.delete_project(404),
        Err(ServiceError::NotFound { .. })
    ));
}

#[test]
fn deleted_project_is_gone() {
    let db = migrated_engine();
    let scope = acquire_scope(&db.engine).unwrap();
    let service = ProjectService::for_session(scope.bind_session());

    let project = service.save_project(&project_payload()).unwrap();
    service.delete_project(project.id).unwrap();

    assert!(matches!(
        service.get_project(project.id),
        Err(ServiceError::NotFound { .. })
    ));
}

#[test]
fn seeded_lookups_are_listed_in_id_order() {
    let db = migrated_engine();
    let scope = acquire_scope(&db.engine).unwrap();
    let session = scope.bind_session();

    let regions = list_lookup(session, LookupTable::Regions).unwrap();
    assert_eq!(regions.len(), 6);
    assert_eq!(regions[0].name, "Lower Mainland");

    let sub_sectors = list_lookup(session, LookupTable::SubSectors).unwrap();
    assert_eq!(sub_sectors.len(), 3);
    assert_eq!(list_lookup(session, LookupTable::Proponents).unwrap().len(), 2);
    assert_eq!(list_lookup(session, LookupTable::Positions).unwrap().len(), 3);
}

#[test]
fn project_serializes_with_optional_address() {
    let project = project_payload().into_project(7);
    let json = serde_json::to_value(&project).unwrap();

    assert_eq!(json["id"], 7);
    assert!(json["address"].is_null());
    assert_eq!(json["is_active"], true);
}
