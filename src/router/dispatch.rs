//! Ordered middleware dispatch.

use log::debug;

use crate::router::handler::Route;
use crate::server::{Error, Request, Response};

/// Run every route entry that matches the request path, in table order.
///
/// Within a matching entry the middleware run one after another. As soon as
/// the response is completed, nothing further runs. Entries with a template
/// or custom pattern replace `req.params` with their captures before their
/// chain starts; the map is cleared again once a chain finishes without
/// completing the response.
///
/// Errors returned by middleware are not caught here; they stop the walk and
/// are returned to the caller.
///
/// A request without a parsed URL, or one whose response is already
/// completed, is left untouched.
pub async fn dispatch(
    routes: &[Route],
    error: Option<&Error>,
    req: &mut Request,
    res: &mut Response,
) -> Result<(), Error> {
    let Some(pathname) = req.pathname().map(str::to_owned) else {
        debug!("No pathname on request, skipping dispatch");
        return Ok(());
    };

    if res.is_completed() {
        debug!("Response already completed, skipping dispatch");
        return Ok(());
    }

    for route in routes {
        if !route.pattern.is_match(&pathname) {
            continue;
        }
        if !route.pattern.is_match_all() {
            req.params = route.pattern.extract_params(&pathname);
        }

        for middleware in &route.handlers {
            middleware(error, &mut *req, &mut *res).await?;

            if res.is_completed() {
                debug!("Response completed by route '{pattern}'", pattern = route.pattern);
                return Ok(());
            }
        }
        req.params.clear();
    }

    Ok(())
}
