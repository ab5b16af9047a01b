//! Priority-weighted route selection.

use std::collections::BTreeSet;

use constellation_core::message::Priority;
use constellation_core::{NodeId, Route, RouteType};

/// Weight in [0, 1] a priority class gives each route type.
pub fn priority_weight(priority: Priority, route_type: RouteType) -> f64 {
    use RouteType::*;
    match (priority, route_type) {
        (Priority::High, Direct) => 1.0,
        (Priority::High, FunctionBased) => 0.8,
        (Priority::High, LoadBalanced) => 0.6,
        (Priority::High, Random) => 0.4,

        (Priority::Medium, Direct) => 0.8,
        (Priority::Medium, FunctionBased) => 1.0,
        (Priority::Medium, LoadBalanced) => 0.8,
        (Priority::Medium, Random) => 0.6,

        (Priority::Low, Direct) => 0.6,
        (Priority::Low, FunctionBased) => 0.8,
        (Priority::Low, LoadBalanced) => 1.0,
        (Priority::Low, Random) => 0.8,
    }
}

pub fn composite_score(route: &Route, priority: Priority) -> f64 {
    priority_weight(priority, route.route_type) * route.route_type.base_weight() * route.score
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub route: Route,
    pub weighted_score: f64,
}

/// Highest composite score; the earliest route wins a tie.
pub fn select(routes: &[Route], priority: Priority) -> Option<Selection> {
    best(routes.iter(), priority)
}

/// As [`select`], ignoring every route whose path touches `excluded`.
pub fn select_excluding(
    routes: &[Route],
    priority: Priority,
    excluded: &BTreeSet<NodeId>,
) -> Option<Selection> {
    best(
        routes
            .iter()
            .filter(|r| !r.path.iter().any(|hop| excluded.contains(hop))),
        priority,
    )
}

fn best<'a>(routes: impl Iterator<Item = &'a Route>, priority: Priority) -> Option<Selection> {
    let mut best: Option<(&Route, f64)> = None;
    for route in routes {
        let score = composite_score(route, priority);
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((route, score));
        }
    }
    best.map(|(route, weighted_score)| Selection {
        route: route.clone(),
        weighted_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn id(port: u16) -> NodeId {
        NodeId::new("127.0.0.1", port)
    }

    fn route(route_type: RouteType, score: f64, path: &[u16]) -> Route {
        Route {
            path: path.iter().map(|p| id(*p)).collect(),
            route_type,
            score,
            metrics: BTreeMap::new(),
        }
    }

    #[test]
    fn high_priority_prefers_direct() {
        let routes = vec![
            route(RouteType::Direct, 100.0, &[2]),
            route(RouteType::FunctionBased, 200.0, &[3, 2]),
        ];
        // 1.0 * 10 * 100 against 0.8 * 3 * 200
        let picked = select(&routes, Priority::High).unwrap();
        assert_eq!(picked.route.route_type, RouteType::Direct);
        assert_eq!(picked.weighted_score, 1000.0);
    }

    #[test]
    fn low_priority_can_prefer_load_balanced() {
        let routes = vec![
            route(RouteType::FunctionBased, 50.0, &[3, 2]),
            route(RouteType::LoadBalanced, 90.0, &[4, 2]),
        ];
        // 0.8 * 3 * 50 = 120 against 1.0 * 2 * 90 = 180
        let picked = select(&routes, Priority::Low).unwrap();
        assert_eq!(picked.route.route_type, RouteType::LoadBalanced);
    }

    #[test]
    fn ties_keep_the_first_route() {
        let routes = vec![
            route(RouteType::Random, 50.0, &[3, 2]),
            route(RouteType::Random, 50.0, &[4, 2]),
        ];
        let picked = select(&routes, Priority::Medium).unwrap();
        assert_eq!(picked.route.path[0], id(3));
    }

    #[test]
    fn excluded_nodes_filter_routes() {
        let routes = vec![
            route(RouteType::FunctionBased, 150.0, &[3, 2]),
            route(RouteType::Random, 50.0, &[4, 2]),
        ];
        let excluded = BTreeSet::from([id(3)]);
        let picked = select_excluding(&routes, Priority::Medium, &excluded).unwrap();
        assert_eq!(picked.route.path, vec![id(4), id(2)]);

        let all = BTreeSet::from([id(2)]);
        assert!(select_excluding(&routes, Priority::Medium, &all).is_none());
        assert!(select(&[], Priority::High).is_none());
    }
}
