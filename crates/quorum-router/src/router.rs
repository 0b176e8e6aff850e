//! Smart order router.
//!
//! Plans a composite order against live venue quotes, then dispatches
//! the child orders in ranked order. Each child executes independently;
//! a failed child is reported, never silently retried. Retry is a
//! separate, explicitly re-planned composite.

use crate::error::{RouterError, RouterResult};
use crate::planner::{self, Plan};
use crate::venue::{VenueClient, VenueFill, VenueQuote};
use chrono::Utc;
use futures_util::future::join_all;
use quorum_core::{
    ChildOrder, CompositeId, CompositeOrder, OrderId, OrderSide, Price, ReservationId, Size,
    SlotId, Symbol, VenueId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Per-venue quote fetch timeout. A venue that times out is excluded
    /// from this plan, not retried mid-plan.
    #[serde(default = "default_quote_timeout_ms")]
    pub quote_timeout_ms: u64,
    /// Per-child submit timeout. A timeout is a definite failure.
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,
    /// Maximum tolerated slippage from the best price, percent.
    #[serde(default = "default_max_slippage_pct")]
    pub max_slippage_pct: Decimal,
}

fn default_quote_timeout_ms() -> u64 {
    500
}

fn default_submit_timeout_ms() -> u64 {
    2000
}

fn default_max_slippage_pct() -> Decimal {
    Decimal::new(3, 1) // 0.3
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            quote_timeout_ms: default_quote_timeout_ms(),
            submit_timeout_ms: default_submit_timeout_ms(),
            max_slippage_pct: default_max_slippage_pct(),
        }
    }
}

/// An accepted plan materialized as a dispatchable composite order.
#[derive(Debug, Clone)]
pub struct PlannedComposite {
    pub order: CompositeOrder,
    pub expected_avg_price: Price,
    pub total_fee: Decimal,
}

/// Terminal outcome of dispatching one child order.
#[derive(Debug, Clone)]
pub enum ChildResult {
    Filled(VenueFill),
    Failed {
        order_id: OrderId,
        venue: VenueId,
        reason: String,
    },
}

pub struct SmartOrderRouter {
    venues: Vec<Arc<dyn VenueClient>>,
    config: RouterConfig,
}

impl SmartOrderRouter {
    pub fn new(venues: Vec<Arc<dyn VenueClient>>, config: RouterConfig) -> Self {
        Self { venues, config }
    }

    /// Fetch quotes from every venue concurrently. Venues that error or
    /// time out are excluded from this plan.
    pub async fn gather_quotes(&self, symbol: &Symbol, side: OrderSide) -> Vec<VenueQuote> {
        let deadline = Duration::from_millis(self.config.quote_timeout_ms);
        let fetches = self.venues.iter().map(|venue| {
            let venue = venue.clone();
            let symbol = symbol.clone();
            async move {
                let id = venue.venue_id();
                match timeout(deadline, venue.quote(&symbol, side)).await {
                    Ok(Ok(quote)) => Some(quote),
                    Ok(Err(err)) => {
                        warn!(venue = %id, %err, "quote fetch failed, venue excluded");
                        None
                    }
                    Err(_) => {
                        warn!(venue = %id, "quote fetch timed out, venue excluded");
                        None
                    }
                }
            }
        });

        join_all(fetches).await.into_iter().flatten().collect()
    }

    /// Plan a composite order for an approved trade.
    pub async fn plan_composite(
        &self,
        slot_id: SlotId,
        reservation_id: ReservationId,
        symbol: &Symbol,
        side: OrderSide,
        amount: Size,
    ) -> RouterResult<PlannedComposite> {
        let quotes = self.gather_quotes(symbol, side).await;
        let plan = planner::plan(quotes, side, amount, self.config.max_slippage_pct)?;

        Ok(self.materialize(slot_id, reservation_id, symbol, side, amount, plan))
    }

    fn materialize(
        &self,
        slot_id: SlotId,
        reservation_id: ReservationId,
        symbol: &Symbol,
        side: OrderSide,
        amount: Size,
        plan: Plan,
    ) -> PlannedComposite {
        let composite_id = CompositeId::new();
        let children = plan
            .legs
            .iter()
            .map(|leg| {
                ChildOrder::new(
                    composite_id,
                    leg.venue.clone(),
                    leg.price,
                    leg.quantity,
                    leg.fee,
                )
            })
            .collect();

        info!(
            %composite_id,
            %slot_id,
            %symbol,
            %side,
            %amount,
            expected_avg = %plan.expected_avg_price,
            "composite planned"
        );
        PlannedComposite {
            order: CompositeOrder {
                composite_id,
                slot_id,
                reservation_id,
                symbol: symbol.clone(),
                side,
                total_amount: amount,
                max_slippage_pct: self.config.max_slippage_pct,
                children,
                created_at: Utc::now(),
            },
            expected_avg_price: plan.expected_avg_price,
            total_fee: plan.total_fee,
        }
    }

    /// Dispatch the composite's children in ranked order.
    ///
    /// Children execute independently: a failure does not stop later
    /// children, and the failed portion is not re-routed.
    pub async fn dispatch(&self, composite: &CompositeOrder) -> Vec<ChildResult> {
        let deadline = Duration::from_millis(self.config.submit_timeout_ms);
        let mut results = Vec::with_capacity(composite.children.len());

        for child in &composite.children {
            let Some(venue) = self.client_for(&child.venue) else {
                warn!(venue = %child.venue, "no client for venue");
                results.push(ChildResult::Failed {
                    order_id: child.order_id.clone(),
                    venue: child.venue.clone(),
                    reason: "no client for venue".to_string(),
                });
                continue;
            };

            let submitted = timeout(
                deadline,
                venue.submit(
                    &child.order_id,
                    &composite.symbol,
                    composite.side,
                    child.price,
                    child.quantity,
                ),
            )
            .await;

            let result = match submitted {
                Ok(Ok(fill)) => {
                    debug!(order_id = %fill.order_id, price = %fill.price, "child filled");
                    ChildResult::Filled(fill)
                }
                Ok(Err(err)) => ChildResult::Failed {
                    order_id: child.order_id.clone(),
                    venue: child.venue.clone(),
                    reason: err.to_string(),
                },
                Err(_) => ChildResult::Failed {
                    order_id: child.order_id.clone(),
                    venue: child.venue.clone(),
                    reason: RouterError::VenueTimeout(child.venue.clone()).to_string(),
                },
            };
            results.push(result);
        }

        results
    }

    /// Best-effort cancel of one child order. Fire and forget: errors
    /// are logged, never propagated.
    pub async fn cancel(&self, venue_id: &VenueId, order_id: &OrderId) {
        let Some(venue) = self.client_for(venue_id) else {
            warn!(venue = %venue_id, "cancel for unknown venue dropped");
            return;
        };
        let deadline = Duration::from_millis(self.config.submit_timeout_ms);
        match timeout(deadline, venue.cancel(order_id)).await {
            Ok(Ok(())) => debug!(%order_id, "cancel acknowledged"),
            Ok(Err(err)) => warn!(%order_id, %err, "cancel rejected"),
            Err(_) => warn!(%order_id, "cancel timed out"),
        }
    }

    fn client_for(&self, venue_id: &VenueId) -> Option<&Arc<dyn VenueClient>> {
        self.venues.iter().find(|v| v.venue_id() == *venue_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::MockVenueClient;
    use rust_decimal_macros::dec;

    fn symbol() -> Symbol {
        Symbol::new("BTC/USDT").unwrap()
    }

    fn mock_venue(name: &'static str, price: Decimal, depth: Decimal) -> MockVenueClient {
        let mut mock = MockVenueClient::new();
        mock.expect_venue_id().return_const(VenueId::from(name));
        mock.expect_quote().returning(move |_, _| {
            Ok(VenueQuote {
                venue: VenueId::from(name),
                price: Price::new(price),
                depth: Size::new(depth),
                fee_pct: dec!(0),
            })
        });
        mock
    }

    #[tokio::test]
    async fn test_plan_excludes_failing_venue() {
        let mut bad = MockVenueClient::new();
        bad.expect_venue_id().return_const(VenueId::from("bad"));
        bad.expect_quote().returning(|_, _| {
            Err(RouterError::NoQuote {
                venue: VenueId::from("bad"),
            })
        });

        let good = mock_venue("good", dec!(100), dec!(10));
        let router = SmartOrderRouter::new(
            vec![Arc::new(bad), Arc::new(good)],
            RouterConfig::default(),
        );

        let planned = router
            .plan_composite(
                SlotId(0),
                ReservationId::new(),
                &symbol(),
                OrderSide::Buy,
                Size::new(dec!(4)),
            )
            .await
            .unwrap();
        assert_eq!(planned.order.children.len(), 1);
        assert_eq!(planned.order.children[0].venue, VenueId::from("good"));
    }

    #[tokio::test]
    async fn test_plan_rejects_slippage() {
        let a = mock_venue("venue-a", dec!(100), dec!(2));
        let b = mock_venue("venue-b", dec!(101), dec!(5));
        let router = SmartOrderRouter::new(
            vec![Arc::new(a), Arc::new(b)],
            RouterConfig {
                max_slippage_pct: dec!(0.3),
                ..Default::default()
            },
        );

        let result = router
            .plan_composite(
                SlotId(0),
                ReservationId::new(),
                &symbol(),
                OrderSide::Buy,
                Size::new(dec!(4)),
            )
            .await;
        assert!(matches!(result, Err(RouterError::SlippageExceeded { .. })));
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_independent() {
        let mut a = mock_venue("venue-a", dec!(100), dec!(2));
        a.expect_submit().returning(|_, _, _, _, _| {
            Err(RouterError::VenueRejected {
                venue: VenueId::from("venue-a"),
                reason: "insufficient balance".to_string(),
            })
        });
        let mut b = mock_venue("venue-b", dec!(100.1), dec!(5));
        b.expect_submit().returning(|order_id, _, _, price, quantity| {
            Ok(VenueFill {
                order_id: order_id.clone(),
                price,
                quantity,
                fee: dec!(0),
            })
        });

        let router = SmartOrderRouter::new(
            vec![Arc::new(a), Arc::new(b)],
            RouterConfig {
                max_slippage_pct: dec!(1),
                ..Default::default()
            },
        );
        let planned = router
            .plan_composite(
                SlotId(0),
                ReservationId::new(),
                &symbol(),
                OrderSide::Buy,
                Size::new(dec!(4)),
            )
            .await
            .unwrap();
        assert_eq!(planned.order.children.len(), 2);

        let results = router.dispatch(&planned.order).await;
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], ChildResult::Failed { .. }));
        assert!(matches!(results[1], ChildResult::Filled(_)));
    }
}
