use actix_web::{web, HttpResponse};
use dms::{Database, DmsError, ErrorKind, Field, ItemPayload};
use serde::Deserialize;

use crate::AppState;

/// Configure all API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(health)).service(
        web::scope("/databases")
            .route("", web::get().to(list_databases))
            .route("", web::post().to(create_database))
            .route("/{db}", web::delete().to(delete_database))
            .route("/{db}/tables", web::get().to(list_tables))
            .route("/{db}/tables", web::post().to(create_table))
            .route("/{db}/tables/{table_id}", web::delete().to(delete_table))
            .route("/{db}/tables/{table_id}/items", web::get().to(list_items))
            .route("/{db}/tables/{table_id}/items", web::post().to(create_item))
            .route("/{db}/tables/{table_id}/items/{item_id}", web::get().to(get_item))
            .route("/{db}/tables/{table_id}/items/{item_id}", web::put().to(update_item))
            .route("/{db}/tables/{table_id}/items/{item_id}", web::delete().to(delete_item)),
    );
}

// ── Helpers ─────────────────────────────────────────────────────────

fn ok_json(value: serde_json::Value) -> HttpResponse {
    HttpResponse::Ok().json(value)
}

fn created_json(value: serde_json::Value) -> HttpResponse {
    HttpResponse::Created().json(value)
}

fn err_response(e: DmsError) -> HttpResponse {
    let body = serde_json::json!({ "error": e.to_string() });
    match e.kind() {
        ErrorKind::NotFound => HttpResponse::NotFound().json(body),
        ErrorKind::Conflict => HttpResponse::Conflict().json(body),
        ErrorKind::InvalidValue => HttpResponse::UnprocessableEntity().json(body),
        ErrorKind::InvalidIdentifier => HttpResponse::BadRequest().json(body),
        ErrorKind::Unavailable => {
            log::warn!("Backing store unavailable: {e}");
            HttpResponse::ServiceUnavailable().json(body)
        }
        ErrorKind::Internal => {
            log::error!("Internal error: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Internal server error"
            }))
        }
    }
}

// ── Status ──────────────────────────────────────────────────────────

async fn health(state: web::Data<AppState>) -> HttpResponse {
    let status = state.service.health().await;
    ok_json(serde_json::json!({ "database_status": status }))
}

// ── Databases ───────────────────────────────────────────────────────

async fn list_databases(state: web::Data<AppState>) -> HttpResponse {
    match state.service.list_databases().await {
        Ok(names) => ok_json(serde_json::json!(names)),
        Err(e) => err_response(e),
    }
}

async fn create_database(
    state: web::Data<AppState>,
    body: web::Json<Database>,
) -> HttpResponse {
    match state.service.create_database(&body).await {
        Ok(name) => created_json(serde_json::json!({ "database_name": name })),
        Err(e) => err_response(e),
    }
}

async fn delete_database(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    match state.service.delete_database(&path).await {
        Ok(name) => ok_json(serde_json::json!({ "deleted": name })),
        Err(e) => err_response(e),
    }
}

// ── Tables ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateTable {
    table_name: String,
    #[serde(default)]
    table_fields: Vec<Field>,
}

async fn list_tables(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    match state.service.list_tables(&path).await {
        Ok(tables) => ok_json(serde_json::json!(tables)),
        Err(e) => err_response(e),
    }
}

async fn create_table(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<CreateTable>,
) -> HttpResponse {
    let CreateTable {
        table_name,
        table_fields,
    } = body.into_inner();
    match state
        .service
        .create_table(&path, &table_name, table_fields)
        .await
    {
        Ok(id) => created_json(serde_json::json!({ "id": id })),
        Err(e) => err_response(e),
    }
}

async fn delete_table(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> HttpResponse {
    let (db, table_id) = path.into_inner();
    match state.service.delete_table(&db, &table_id).await {
        Ok(id) => ok_json(serde_json::json!({ "deleted": id })),
        Err(e) => err_response(e),
    }
}

// ── Items ───────────────────────────────────────────────────────────

async fn list_items(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> HttpResponse {
    let (db, table_id) = path.into_inner();
    let cursor = match state.service.list_items(&db, &table_id).await {
        Ok(cursor) => cursor,
        Err(e) => return err_response(e),
    };
    match cursor.collect::<dms::Result<Vec<_>>>() {
        Ok(items) => ok_json(serde_json::json!(items)),
        Err(e) => err_response(e),
    }
}

async fn get_item(
    state: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
) -> HttpResponse {
    let (db, table_id, item_id) = path.into_inner();
    match state.service.get_item(&db, &table_id, &item_id).await {
        Ok(item) => ok_json(serde_json::json!(item)),
        Err(e) => err_response(e),
    }
}

async fn create_item(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<ItemPayload>,
) -> HttpResponse {
    let (db, table_id) = path.into_inner();
    match state
        .service
        .create_item(&db, &table_id, body.into_inner())
        .await
    {
        Ok(id) => created_json(serde_json::json!({ "id": id })),
        Err(e) => err_response(e),
    }
}

async fn update_item(
    state: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
    body: web::Json<ItemPayload>,
) -> HttpResponse {
    let (db, table_id, item_id) = path.into_inner();
    match state
        .service
        .update_item(&db, &table_id, &item_id, body.into_inner())
        .await
    {
        Ok(id) => ok_json(serde_json::json!({ "id": id })),
        Err(e) => err_response(e),
    }
}

async fn delete_item(
    state: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
) -> HttpResponse {
    let (db, table_id, item_id) = path.into_inner();
    match state.service.delete_item(&db, &table_id, &item_id).await {
        Ok(id) => ok_json(serde_json::json!({ "deleted": id })),
        Err(e) => err_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use dms::store::MemoryStore;
    use dms::Service;
    use std::sync::Arc;

    fn state() -> web::Data<AppState> {
        web::Data::new(AppState {
            service: Service::new(Arc::new(MemoryStore::new())),
        })
    }

    #[actix_web::test]
    async fn test_health() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let resp: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/").to_request())
                .await;
        assert_eq!(resp, serde_json::json!({ "database_status": "healthy" }));
    }

    #[actix_web::test]
    async fn test_table_and_item_flow() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/databases")
            .set_json(serde_json::json!({ "database_name": "shop" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri("/databases/shop/tables")
            .set_json(serde_json::json!({
                "table_name": "orders",
                "table_fields": [
                    { "field_name": "quantity", "field_type": "integer" },
                    { "field_name": "price", "field_type": "real" },
                ],
            }))
            .to_request();
        let created: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let table_id = created["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri("/databases/shop/tables")
            .set_json(serde_json::json!({ "table_name": "orders" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let items_uri = format!("/databases/shop/tables/{table_id}/items");
        let req = test::TestRequest::post()
            .uri(&items_uri)
            .set_json(serde_json::json!({ "quantity": 3, "price": 19.99 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri(&items_uri)
            .set_json(serde_json::json!({ "quantity": "three", "price": 19.99 }))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let req = test::TestRequest::get().uri(&items_uri).to_request();
        let items: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(items.as_array().map(Vec::len), Some(1));

        let req = test::TestRequest::get()
            .uri(&format!("{items_uri}/not-an-id"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::delete()
            .uri("/databases/ghost")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
