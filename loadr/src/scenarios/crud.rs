use std::time::Duration;

use async_trait::async_trait;
use loadr_core::{CheckResult, IterationContext, Scenario};
use serde_json::{Value, json};

use super::{Api, check_all, check_tracked, json_body, status_is, unique_suffix};

pub(crate) const USERS_GROUP: &str = "User Operations";
pub(crate) const PRODUCTS_GROUP: &str = "Product Operations";

pub(crate) struct CrudScenario {
    pub(crate) api: Api,
    pub(crate) pause: Duration,
}

#[async_trait]
impl Scenario for CrudScenario {
    fn name(&self) -> &str {
        "crud"
    }

    async fn run(&self, ctx: &mut IterationContext) -> Vec<CheckResult> {
        user_operations(ctx, &self.api).await;
        ctx.sleep(self.pause).await;
        product_operations(ctx, &self.api).await;
        ctx.sleep(self.pause).await;
        ctx.take_checks()
    }
}

/// List, create, read, update and delete a user. The follow-up calls only run when the
/// create checks passed and the response carried an id.
pub(crate) async fn user_operations(ctx: &mut IterationContext, api: &Api) {
    ctx.begin_group(USERS_GROUP);
    let users = api.url("/api/users");

    let res = ctx.get("GET /api/users", &users).await.ok();
    let body = json_body(res.as_ref());
    check_tracked(
        ctx,
        &[
            ("get users status is 200", status_is(res.as_ref(), 200)),
            (
                "get users returns array",
                body.as_ref().is_some_and(Value::is_array),
            ),
        ],
    );

    let suffix = unique_suffix(ctx);
    let new_user = json!({
        "name": format!("Load Test User {suffix}"),
        "email": format!("test-{suffix}@example.com"),
    });
    let res = ctx.post_json("POST /api/users", &users, &new_user).await.ok();
    let body = json_body(res.as_ref());
    let id = body.as_ref().and_then(|v| v["id"].as_u64());
    let created = check_all(
        ctx,
        &[
            ("create user status is 201", status_is(res.as_ref(), 201)),
            (
                "user has id",
                body.as_ref().is_some_and(|v| !v["id"].is_null()),
            ),
        ],
    );

    if let (true, Some(id)) = (created, id) {
        let user = format!("{users}/{id}");

        let res = ctx.get("GET /api/users/{id}", &user).await.ok();
        check_tracked(
            ctx,
            &[("get single user status is 200", status_is(res.as_ref(), 200))],
        );

        let update = json!({ "name": format!("Updated User {}", unique_suffix(ctx)) });
        let res = ctx
            .put_json("PUT /api/users/{id}", &user, &update)
            .await
            .ok();
        check_tracked(
            ctx,
            &[("update user status is 200", status_is(res.as_ref(), 200))],
        );

        let res = ctx.delete("DELETE /api/users/{id}", &user).await.ok();
        check_tracked(
            ctx,
            &[("delete user status is 204", status_is(res.as_ref(), 204))],
        );
    }

    ctx.end_group();
}

pub(crate) async fn product_operations(ctx: &mut IterationContext, api: &Api) {
    ctx.begin_group(PRODUCTS_GROUP);
    let products = api.url("/api/products");

    let res = ctx.get("GET /api/products", &products).await.ok();
    let body = json_body(res.as_ref());
    check_tracked(
        ctx,
        &[
            ("get products status is 200", status_is(res.as_ref(), 200)),
            (
                "products have required fields",
                body.as_ref().is_some_and(has_required_product_fields),
            ),
        ],
    );

    let new_product = json!({
        "name": format!("Load Test Product {}", unique_suffix(ctx)),
        "price": 99.99,
        "stock": 100,
    });
    let res = ctx
        .post_json("POST /api/products", &products, &new_product)
        .await
        .ok();
    check_tracked(
        ctx,
        &[("create product status is 201", status_is(res.as_ref(), 201))],
    );

    ctx.end_group();
}

/// An empty list passes; otherwise the first product must carry every catalogue field.
fn has_required_product_fields(body: &Value) -> bool {
    let Some(list) = body.as_array() else {
        return false;
    };
    list.first().is_none_or(|product| {
        ["id", "name", "price", "stock"]
            .iter()
            .all(|field| !product[*field].is_null())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_field_check() {
        assert!(has_required_product_fields(&json!([])));
        assert!(has_required_product_fields(&json!([
            { "id": 1, "name": "Laptop", "price": 999.99, "stock": 10 }
        ])));
        assert!(!has_required_product_fields(&json!([
            { "id": 1, "name": "Laptop", "price": 999.99 }
        ])));
        assert!(!has_required_product_fields(&json!({ "error": "nope" })));
    }
}
