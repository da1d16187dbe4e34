use super::*;

#[test]
fn http_status_mapping() {
    assert_eq!(AppError::validation("bad_input", "oops").http_status(), 400);
    assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
    assert_eq!(AppError::already_exists("exists", "dup").http_status(), 409);
    assert_eq!(AppError::unauthorized("unauthorized", "no").http_status(), 401);
    assert_eq!(AppError::precondition("no_config", "none").http_status(), 412);
    assert_eq!(AppError::upstream("identity_unavailable", "down").http_status(), 502);
    assert_eq!(AppError::canceled("canceled", "gone").http_status(), 408);
    assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
}

#[test]
fn login_narrowing_hides_existence() {
    let missing_role = AppError::not_found("role_not_found", "role devrole does not exist").narrow_for_login();
    let not_member = AppError::unauthorized("not_member", "no matching group").narrow_for_login();
    let no_config = AppError::precondition("no_config", "config missing").narrow_for_login();
    assert_eq!(missing_role, not_member);
    assert_eq!(no_config, not_member);
    assert_eq!(missing_role, unauthorized_denial());
}

#[test]
fn login_narrowing_keeps_upstream_and_cancel() {
    let up = AppError::upstream("identity_unavailable", "503").narrow_for_login();
    assert_eq!(up.http_status(), 502);
    let c = AppError::canceled("canceled", "deadline").narrow_for_login();
    assert_eq!(c.http_status(), 408);
    // internal detail is not echoed to the caller
    let i = AppError::internal("storage_error", "disk path /var/x").narrow_for_login();
    assert_eq!(i.message(), "internal error");
}

#[test]
fn serde_tagging() {
    let v = serde_json::to_value(AppError::validation("missing_home_tenancy_id", "missing homeTenancyId")).unwrap();
    assert_eq!(v["type"], "validation");
    assert_eq!(v["code"], "missing_home_tenancy_id");
}
