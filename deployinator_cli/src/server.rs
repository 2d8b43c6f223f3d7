use actix_web::{get, middleware::Logger, web, App, HttpResponse, HttpServer, Responder};
use std::net::SocketAddr;

use super::Result;

#[get("/")]
async fn echo() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain").body("echo")
}

#[get("/status/ready")]
async fn ready() -> impl Responder {
    HttpResponse::Ok().finish()
}

#[get("/status/alive")]
async fn alive() -> impl Responder {
    HttpResponse::Ok().finish()
}

/// Routes, shared by the server and tests
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(echo).service(ready).service(alive);
}

pub async fn run(addr: SocketAddr) -> Result<()> {
    info!("Listening on {}", addr);
    HttpServer::new(|| App::new().wrap(Logger::default()).configure(configure))
        .bind(addr)?
        .run()
        .await?;
    Ok(())
}
