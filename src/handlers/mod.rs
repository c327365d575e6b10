pub mod download;
pub mod form;

pub use download::download;
pub use form::index;

use actix_web::web;

/// The route table. Built once per worker at startup and never changed afterwards.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/download", web::post().to(download));
}
