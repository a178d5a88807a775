use crate::{
    auth::auth::AuthUser,
    config::Config,
    error::{AppError, AppResult},
    import::{ImportTarget, run_import},
    utils::audit::{client_ip, record_activity},
};
use actix_web::{HttpRequest, HttpResponse, web};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

/// Import a spreadsheet
#[utoipa::path(
    post,
    path = "/api/import/{target}",
    params(("target" = String, Path, description = "employees, cash-receives or cash-payments")),
    request_body(
        content = Vec<u8>,
        description = "xlsx, xls or CSV file as the raw body",
        content_type = "application/octet-stream"
    ),
    responses(
        (status = 200, description = "Import report", body = ImportReport),
        (status = 400, description = "Unreadable file or no header row"),
        (status = 404, description = "Unknown import target"),
        (status = 413, description = "File too large")
    ),
    security(("bearer_auth" = [])),
    tag = "Import"
)]
pub async fn import_file(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
    path: web::Path<String>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let target = ImportTarget::from_str(&path)
        .map_err(|_| AppError::NotFound(format!("Unknown import target '{path}'")))?;

    if body.len() > config.max_import_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "File exceeds {} bytes",
            config.max_import_bytes
        )));
    }
    if body.is_empty() {
        return Err(AppError::BadRequest("Empty upload".into()));
    }

    info!(%target, bytes = body.len(), "Import upload received");
    let report = run_import(pool.get_ref(), target, &body).await?;

    record_activity(
        pool.get_ref(),
        Some(&auth.username),
        "import",
        Some(&format!(
            "{target}: {} inserted, {} updated, {} skipped, {} errors",
            report.inserted,
            report.updated,
            report.skipped,
            report.errors.len()
        )),
        client_ip(&req).as_deref(),
    )
    .await;

    Ok(HttpResponse::Ok().json(report))
}

#[cfg(test)]
mod tests {
    use crate::{model::role::Role, test_support::TestContext};
    use actix_web::{http::StatusCode, test};
    use rust_xlsxwriter::Workbook;
    use serde_json::Value;

    fn employee_workbook() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Staff List 2026").unwrap();
        sheet.write_string(2, 0, "Employee ID").unwrap();
        sheet.write_string(2, 1, "Full Name").unwrap();
        sheet.write_string(2, 2, "Department").unwrap();
        sheet.write_number(3, 0, 1001.0).unwrap();
        sheet.write_string(3, 1, "Karim Uddin").unwrap();
        sheet.write_string(3, 2, "Civil").unwrap();
        // no identifier: skipped
        sheet.write_string(4, 1, "Nameless Row").unwrap();
        sheet.write_string(5, 0, "1002").unwrap();
        sheet.write_string(5, 1, "Salma Akter").unwrap();
        workbook.save_to_buffer().unwrap()
    }

    #[actix_web::test]
    async fn xlsx_upload_skips_rows_without_identifier() {
        let ctx = TestContext::new().await;
        let app = test::init_service(ctx.app()).await;

        let req = test::TestRequest::post()
            .uri("/api/import/employees")
            .insert_header(ctx.bearer_for("hr", Role::Hr, None))
            .insert_header(("Content-Type", "application/octet-stream"))
            .set_payload(employee_workbook())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let report: Value = test::read_body_json(resp).await;
        assert_eq!(report["inserted"], 2);
        assert_eq!(report["skipped"], 1);

        let codes: Vec<String> =
            sqlx::query_scalar("SELECT employee_code FROM employees ORDER BY employee_code")
                .fetch_all(&ctx.pool)
                .await
                .unwrap();
        assert_eq!(codes, vec!["1001", "1002"]);
    }

    #[actix_web::test]
    async fn unknown_target_oversize_and_role_checks() {
        let ctx = TestContext::new().await;
        let app = test::init_service(ctx.app()).await;
        let hr = ctx.bearer_for("hr", Role::Hr, None);

        let req = test::TestRequest::post()
            .uri("/api/import/payroll")
            .insert_header(hr.clone())
            .set_payload("a,b\n1,2\n")
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::NOT_FOUND
        );

        let req = test::TestRequest::post()
            .uri("/api/import/cash-receives")
            .insert_header(hr)
            .set_payload(vec![b'a'; ctx.config.max_import_bytes + 1])
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );

        let req = test::TestRequest::post()
            .uri("/api/import/employees")
            .insert_header(ctx.bearer_for("e", Role::Employee, Some("EMP-1")))
            .set_payload("Employee ID,Name\n1,A\n")
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::FORBIDDEN
        );
    }

    #[actix_web::test]
    async fn csv_cash_import_reports_bad_rows() {
        let ctx = TestContext::new().await;
        let app = test::init_service(ctx.app()).await;

        let csv = "Voucher No,Date,Received From,Amount\n\
                   CR-1,01/02/2026,ACME,\"1,500.00\"\n\
                   CR-2,02/02/2026,Beta,n/a\n\
                   ,03/02/2026,Nobody,10\n";
        let req = test::TestRequest::post()
            .uri("/api/import/cash-receives")
            .insert_header(ctx.bearer_for("admin", Role::Admin, None))
            .set_payload(csv)
            .to_request();
        let report: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(report["inserted"], 1);
        assert_eq!(report["skipped"], 1);
        assert_eq!(report["errors"][0]["row"], 3);

        let amount: f64 = sqlx::query_scalar("SELECT amount FROM cash_receives WHERE voucher_no = 'CR-1'")
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
        assert_eq!(amount, 1500.0);
    }
}
