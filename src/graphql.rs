use std::sync::Arc;

use async_graphql::{
    Context, EmptySubscription, InputObject, Object, Result, Schema, SimpleObject,
};

use crate::backend::Backend;
use crate::identity::{self, Identity, Rejection};
use crate::post::Post;
use crate::session::ClientSession;
use crate::stamp::Timestamp;
use crate::user::User;

pub type BoardSchema = Schema<Query, Mutation, EmptySubscription>;

pub fn schema(identity: Arc<Identity>, backend: Arc<Backend>) -> BoardSchema {
    Schema::build(Query, Mutation, EmptySubscription)
        .data(identity)
        .data(backend)
        .finish()
}

fn internal() -> async_graphql::Error {
    async_graphql::Error::new("internal error")
}

fn now() -> Result<Timestamp> {
    Timestamp::now().map_err(|()| internal())
}

#[derive(InputObject)]
pub struct UsernamePasswordInput {
    pub username: String,
    pub password: String,
}

#[derive(Debug, SimpleObject)]
pub struct FieldError {
    field: String,
    message: String,
}

impl From<identity::FieldError> for FieldError {
    fn from(e: identity::FieldError) -> Self {
        Self {
            field: e.field.into(),
            message: e.message.into(),
        }
    }
}

#[derive(SimpleObject)]
pub struct UserResponse {
    errors: Option<Vec<FieldError>>,
    user: Option<User>,
}

/// Field errors come back in-band; anything internal is an opaque
/// top-level graphql error.
fn respond(result: identity::Result<User>) -> Result<UserResponse> {
    match result {
        Ok(user) => Ok(UserResponse {
            errors: None,
            user: Some(user),
        }),
        Err(Rejection::Field(e)) => Ok(UserResponse {
            errors: Some(vec![e.into()]),
            user: None,
        }),
        Err(Rejection::Internal) => Err(internal()),
    }
}

#[Object]
impl User {
    async fn id(&self) -> i64 {
        self.id
    }

    async fn username(&self) -> &str {
        &self.username
    }

    async fn created_at(&self) -> Timestamp {
        self.created_at
    }

    async fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    // no password_hash resolver - the hash stays server-side
}

#[Object]
impl Post {
    async fn id(&self) -> i64 {
        self.id
    }

    async fn title(&self) -> &str {
        &self.title
    }

    async fn created_at(&self) -> Timestamp {
        self.created_at
    }

    async fn updated_at(&self) -> Timestamp {
        self.updated_at
    }
}

pub struct Query;

#[Object]
impl Query {
    async fn me(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        let identity = ctx.data_unchecked::<Arc<Identity>>();
        let session = ctx.data_unchecked::<ClientSession>();

        identity.me(session).await.map_err(|_| internal())
    }

    async fn posts(&self, ctx: &Context<'_>) -> Result<Vec<Post>> {
        let backend = ctx.data_unchecked::<Arc<Backend>>();

        backend.posts().await.map_err(|()| internal())
    }

    async fn post(&self, ctx: &Context<'_>, id: i64) -> Result<Option<Post>> {
        let backend = ctx.data_unchecked::<Arc<Backend>>();

        backend.post(id).await.map_err(|()| internal())
    }
}

pub struct Mutation;

#[Object]
impl Mutation {
    async fn register(
        &self,
        ctx: &Context<'_>,
        options: UsernamePasswordInput,
    ) -> Result<UserResponse> {
        let identity = ctx.data_unchecked::<Arc<Identity>>();
        let session = ctx.data_unchecked::<ClientSession>();

        respond(
            identity
                .register(session, &options.username, &options.password)
                .await,
        )
    }

    async fn login(
        &self,
        ctx: &Context<'_>,
        options: UsernamePasswordInput,
    ) -> Result<UserResponse> {
        let identity = ctx.data_unchecked::<Arc<Identity>>();
        let session = ctx.data_unchecked::<ClientSession>();

        respond(
            identity
                .login(session, &options.username, &options.password)
                .await,
        )
    }

    async fn create_post(&self, ctx: &Context<'_>, title: String) -> Result<Post> {
        let backend = ctx.data_unchecked::<Arc<Backend>>();

        backend
            .create_post(&title, now()?)
            .await
            .map_err(|()| internal())
    }

    async fn update_post(
        &self,
        ctx: &Context<'_>,
        id: i64,
        title: String,
    ) -> Result<Option<Post>> {
        let backend = ctx.data_unchecked::<Arc<Backend>>();

        backend
            .update_post(id, &title, now()?)
            .await
            .map_err(|()| internal())
    }

    async fn delete_post(&self, ctx: &Context<'_>, id: i64) -> Result<bool> {
        let backend = ctx.data_unchecked::<Arc<Backend>>();

        backend.delete_post(id).await.map_err(|()| internal())
    }
}

#[cfg(test)]
#[cfg(not(feature = "session-redis"))]
mod test {
    use super::*;

    use async_graphql::Request;
    use serde_json::{json, Value};

    use crate::backend;
    use crate::session::SessionStore;

    async fn create_schema() -> BoardSchema {
        let db = backend::test::create_db().await;
        let backend = Arc::new(Backend(db));
        let sessions = Arc::new(SessionStore::new());
        let identity = Arc::new(Identity::new(Arc::clone(&backend), sessions));

        schema(identity, backend)
    }

    async fn execute(schema: &BoardSchema, session: &ClientSession, query: &str) -> Value {
        let resp = schema
            .execute(Request::new(query).data(session.clone()))
            .await;

        assert!(resp.errors.is_empty(), "graphql errors: {:?}", resp.errors);
        resp.data.into_json().unwrap()
    }

    #[tokio::test]
    async fn register_sets_a_session_me_resolves_it() {
        let schema = create_schema().await;

        let session = ClientSession::from_cookie(None);
        let data = execute(
            &schema,
            &session,
            r#"mutation {
                register(options: { username: "alice", password: "secretpw" }) {
                    errors { field message }
                    user { id username }
                }
            }"#,
        )
        .await;

        assert_eq!(data["register"]["errors"], Value::Null);
        assert_eq!(data["register"]["user"]["username"], "alice");
        let registered_id = data["register"]["user"]["id"].clone();

        // the mutation issued a token; present it as the qid cookie would be
        let token = session.fresh().expect("token issued").to_string();
        let session = ClientSession::from_cookie(Some(&token));

        let data = execute(&schema, &session, "{ me { id username } }").await;
        assert_eq!(data["me"]["username"], "alice");
        assert_eq!(data["me"]["id"], registered_id);
    }

    #[tokio::test]
    async fn me_without_a_cookie_is_null() {
        let schema = create_schema().await;

        let session = ClientSession::from_cookie(None);
        let data = execute(&schema, &session, "{ me { id } }").await;

        assert_eq!(data["me"], Value::Null);
    }

    #[tokio::test]
    async fn failed_register_reports_the_field() {
        let schema = create_schema().await;

        let session = ClientSession::from_cookie(None);
        let data = execute(
            &schema,
            &session,
            r#"mutation {
                register(options: { username: "ab", password: "secretpw" }) {
                    errors { field message }
                    user { id }
                }
            }"#,
        )
        .await;

        assert_eq!(
            data["register"],
            json!({
                "errors": [{
                    "field": "username",
                    "message": "Length must be greater than 2.",
                }],
                "user": null,
            }),
        );

        // no session either
        assert!(session.fresh().is_none());
    }

    #[tokio::test]
    async fn login_reports_wrong_password_in_band() {
        let schema = create_schema().await;

        let session = ClientSession::from_cookie(None);
        execute(
            &schema,
            &session,
            r#"mutation {
                register(options: { username: "alice", password: "secretpw" }) {
                    user { id }
                }
            }"#,
        )
        .await;

        let session = ClientSession::from_cookie(None);
        let data = execute(
            &schema,
            &session,
            r#"mutation {
                login(options: { username: "alice", password: "wrong" }) {
                    errors { field message }
                    user { id }
                }
            }"#,
        )
        .await;

        assert_eq!(data["login"]["user"], Value::Null);
        assert_eq!(data["login"]["errors"][0]["field"], "password");
    }

    #[tokio::test]
    async fn post_crud_round_trip() {
        let schema = create_schema().await;
        let session = ClientSession::from_cookie(None);

        let data = execute(
            &schema,
            &session,
            r#"mutation { createPost(title: "hello world") { id title } }"#,
        )
        .await;
        assert_eq!(data["createPost"]["title"], "hello world");
        let id = data["createPost"]["id"].as_i64().unwrap();

        let data = execute(&schema, &session, "{ posts { id title } }").await;
        assert_eq!(data["posts"].as_array().unwrap().len(), 1);

        let data = execute(
            &schema,
            &session,
            &format!(r#"mutation {{ updatePost(id: {id}, title: "renamed") {{ title }} }}"#),
        )
        .await;
        assert_eq!(data["updatePost"]["title"], "renamed");

        let data = execute(
            &schema,
            &session,
            &format!("mutation {{ deletePost(id: {id}) }}"),
        )
        .await;
        assert_eq!(data["deletePost"], true);

        let data = execute(&schema, &session, &format!("{{ post(id: {id}) {{ id }} }}")).await;
        assert_eq!(data["post"], Value::Null);
    }

    #[tokio::test]
    async fn deleting_a_missing_post_is_false() {
        let schema = create_schema().await;
        let session = ClientSession::from_cookie(None);

        let data = execute(&schema, &session, "mutation { deletePost(id: 42) }").await;
        assert_eq!(data["deletePost"], false);
    }
}
