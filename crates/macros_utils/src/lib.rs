//! Declarative helpers shared by the workspace's web apps.

/// Generate a `routes` function that registers every listed handler on an
/// actix-web `ServiceConfig`, for use with `App::configure` or
/// `Scope::configure`.
///
/// ```ignore
/// macros_utils::routes! {
///     route health_route,
///     route list_services,
/// }
/// ```
#[cfg(feature = "actix")]
#[macro_export]
macro_rules! routes {
    ($(route $handler:ident),* $(,)?) => {
        pub fn routes(cfg: &mut $crate::__private::actix_web::web::ServiceConfig) {
            $( cfg.service($handler); )*
        }
    };
}

#[cfg(feature = "actix")]
#[doc(hidden)]
pub mod __private {
    pub use actix_web;
}
