mod args;
mod backend;
mod graphql;
mod identity;
mod post;
mod session;
mod stamp;
mod user;

use std::convert::Infallible;
use std::sync::Arc;

use async_graphql::http::GraphiQLSource;
use clap::Parser;
use cookie::{Cookie, SameSite};
use log::{error, info};
use serde::Serialize;
use warp::http::header::SET_COOKIE;
use warp::http::StatusCode;
use warp::{Filter, Reply};

use args::Args;
use backend::Backend;
use graphql::BoardSchema;
use identity::Identity;
use session::{ClientSession, SessionId, SessionStore};

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let args = Args::parse();
    let addr = match args.addr() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("couldn't parse address: {e}");
            std::process::exit(1);
        }
    };

    let backend = Arc::new(Backend::new(args.data_dir()).await);

    #[cfg(not(feature = "session-redis"))]
    let sessions = Arc::new(SessionStore::new());
    #[cfg(feature = "session-redis")]
    let sessions = Arc::new(
        SessionStore::new(args.redis_url())
            .await
            .expect("redis connection"),
    );

    let identity = Arc::new(Identity::new(Arc::clone(&backend), sessions));
    let schema = graphql::schema(identity, backend);

    let secure = args.secure();

    let api = warp::path!("graphql")
        .and(warp::post())
        .and(async_graphql_warp::graphql(schema))
        .and(warp::cookie::optional(session::COOKIE))
        .and_then(
            move |(schema, request): (BoardSchema, async_graphql::Request),
                  cookie: Option<String>| async move {
                let client = ClientSession::from_cookie(cookie.as_deref());

                let resp = schema.execute(request.data(client.clone())).await;
                let mut reply =
                    async_graphql_warp::GraphQLResponse::from(resp).into_response();

                // a mutation bound a fresh session - hand its token back
                if let Some(token) = client.fresh() {
                    match session_cookie(token, secure).to_string().parse() {
                        Ok(value) => {
                            reply.headers_mut().append(SET_COOKIE, value);
                        }
                        Err(e) => error!("couldn't encode session cookie: {e}"),
                    }
                }

                Ok::<_, Infallible>(reply)
            },
        );

    let graphiql = warp::path!("graphql").and(warp::get()).map(|| {
        warp::reply::html(GraphiQLSource::build().endpoint("/graphql").finish())
    });

    let routes = api
        .or(graphiql)
        .recover(handle_rejection)
        .with(warp::log("qboard"));

    info!("listening on {addr}");
    warp::serve(routes).run(addr).await;
}

fn session_cookie(token: SessionId, secure: bool) -> Cookie<'static> {
    Cookie::build((session::COOKIE, token.to_string()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::seconds(session::TTL_SECONDS as i64))
        .build()
}

#[derive(Serialize)]
struct ErrorMessage {
    error: &'static str,
}

async fn handle_rejection(err: warp::Rejection) -> Result<impl Reply, Infallible> {
    let (status, error) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found")
    } else {
        (StatusCode::BAD_REQUEST, "bad request")
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorMessage { error }),
        status,
    ))
}
