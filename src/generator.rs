// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Entity generators.
//!
//! Each function builds one fully populated entity from its keys, the scale
//! parameters and an "outlier" flag (original item/stock, bad-credit customer,
//! undelivered order). Every variable field is drawn from the caller's
//! [`RandomHelper`].

use std::collections::HashSet;

use crate::random::{last_name, RandomHelper};
use crate::scale::ScaleParameters;
use crate::types::{
    Address, Credit, Customer, District, History, Item, Order, OrderLine, Stock, Warehouse,
    MAX_CUSTOMER_DATA, ORIGINAL_MARKER,
};

pub const MIN_OL_CNT: u32 = 5;
pub const MAX_OL_CNT: u32 = 15;
pub const INITIAL_W_YTD: f64 = 300_000.00;
pub const INITIAL_D_YTD: f64 = 30_000.00;
pub const INITIAL_BALANCE: f64 = -10.00;
pub const INITIAL_YTD_PAYMENT: f64 = 10.00;
pub const INITIAL_CREDIT_LIM: f64 = 50_000.00;
pub const INITIAL_HISTORY_AMOUNT: f64 = 10.00;
pub const INITIAL_ORDER_LINE_QUANTITY: u32 = 5;
pub const MIDDLE_NAME: &str = "OE";
/// Customers per district that receive a deterministic last name.
pub const DETERMINISTIC_LAST_NAMES: u32 = 1000;

/// Share of rows (in percent) flagged as outliers.
pub const OUTLIER_PERCENT: u32 = 10;

/// Number of outliers among `count` rows.
pub fn outlier_count(count: u32) -> usize {
    (count * OUTLIER_PERCENT / 100) as usize
}

fn make_address(rng: &mut RandomHelper) -> Address {
    Address {
        street_1: rng.alpha_string(10, 20),
        street_2: rng.alpha_string(10, 20),
        city: rng.alpha_string(10, 20),
        state: rng.alpha_string(2, 2).to_uppercase(),
        zip: format!("{}11111", rng.num_string(4, 4)),
    }
}

fn make_tax(rng: &mut RandomHelper) -> f64 {
    rng.fixed_point(4, 0.0, 0.2)
}

/// Random data string of 26-50 characters, carrying the original marker at a
/// random offset when `original` is set.
fn make_data(rng: &mut RandomHelper, original: bool) -> String {
    let mut data = rng.alpha_string(26, 50);
    if original {
        let offset = rng.number(0, (data.len() - ORIGINAL_MARKER.len()) as u32) as usize;
        data.replace_range(offset..offset + ORIGINAL_MARKER.len(), ORIGINAL_MARKER);
    }
    data
}

pub fn generate_item(rng: &mut RandomHelper, i_id: u32, original: bool) -> Item {
    Item {
        i_id,
        im_id: rng.number(1, 10_000),
        name: rng.alpha_string(14, 24),
        price: rng.fixed_point(2, 1.00, 100.00),
        data: make_data(rng, original),
    }
}

pub fn generate_warehouse(rng: &mut RandomHelper, w_id: u32) -> Warehouse {
    Warehouse {
        w_id,
        name: rng.alpha_string(6, 10),
        address: make_address(rng),
        tax: make_tax(rng),
        ytd: INITIAL_W_YTD,
    }
}

pub fn generate_district(
    rng: &mut RandomHelper,
    w_id: u32,
    d_id: u32,
    scale: &ScaleParameters,
) -> District {
    District {
        w_id,
        d_id,
        name: rng.alpha_string(6, 10),
        address: make_address(rng),
        tax: make_tax(rng),
        ytd: INITIAL_D_YTD,
        next_o_id: scale.customers_per_district + 1,
    }
}

/// Builds customer `c_id`.
///
/// The first 1000 customers of a district get `last_name(c_id - 1)` so every
/// name is guaranteed to exist; later customers get a skewed random name.
pub fn generate_customer(
    rng: &mut RandomHelper,
    w_id: u32,
    d_id: u32,
    c_id: u32,
    scale: &ScaleParameters,
    bad_credit: bool,
    now: i64,
) -> Customer {
    let last = if c_id <= DETERMINISTIC_LAST_NAMES {
        last_name(c_id - 1)
    } else {
        rng.random_last_name(scale.customers_per_district)
    };
    Customer {
        w_id,
        d_id,
        c_id,
        first: rng.alpha_string(8, 16),
        middle: MIDDLE_NAME.to_string(),
        last,
        address: make_address(rng),
        phone: rng.num_string(16, 16),
        since: now,
        credit: if bad_credit { Credit::Bad } else { Credit::Good },
        credit_lim: INITIAL_CREDIT_LIM,
        discount: rng.fixed_point(4, 0.0, 0.5),
        balance: INITIAL_BALANCE,
        ytd_payment: INITIAL_YTD_PAYMENT,
        payment_cnt: 1,
        delivery_cnt: 0,
        data: rng.alpha_string(300, MAX_CUSTOMER_DATA),
    }
}

pub fn generate_history(
    rng: &mut RandomHelper,
    w_id: u32,
    d_id: u32,
    c_id: u32,
    now: i64,
) -> History {
    History {
        c_id,
        c_d_id: d_id,
        c_w_id: w_id,
        d_id,
        w_id,
        date: now,
        amount: INITIAL_HISTORY_AMOUNT,
        data: rng.alpha_string(12, 24),
    }
}

/// Builds order `o_id` without its lines.
///
/// `new_order` marks the order as part of the undelivered backlog: no carrier
/// and no delivery timestamp.
#[allow(clippy::too_many_arguments)]
pub fn generate_order(
    rng: &mut RandomHelper,
    w_id: u32,
    d_id: u32,
    o_id: u32,
    c_id: u32,
    ol_cnt: u32,
    new_order: bool,
    now: i64,
) -> Order {
    Order {
        w_id,
        d_id,
        o_id,
        c_id,
        entry_d: now,
        carrier_id: if new_order { None } else { Some(rng.number(1, 10)) },
        delivery_d: if new_order { None } else { Some(now) },
        ol_cnt,
        all_local: true,
    }
}

/// Builds one line of a loaded order.
///
/// One line in a hundred references item `items + 1`, which does not exist.
/// Lines of undelivered orders carry a zero amount.
#[allow(clippy::too_many_arguments)]
pub fn generate_order_line(
    rng: &mut RandomHelper,
    w_id: u32,
    d_id: u32,
    o_id: u32,
    number: u32,
    scale: &ScaleParameters,
    new_order: bool,
    now: i64,
) -> OrderLine {
    let i_id = if rng.chance(1) {
        scale.items + 1
    } else {
        rng.number(1, scale.items)
    };
    OrderLine {
        w_id,
        d_id,
        o_id,
        number,
        i_id,
        supply_w_id: w_id,
        delivery_d: if new_order { None } else { Some(now) },
        quantity: INITIAL_ORDER_LINE_QUANTITY,
        amount: if new_order {
            0.0
        } else {
            rng.fixed_point(2, 0.01, 9999.99)
        },
        dist_info: rng.alpha_string(24, 24),
    }
}

pub fn generate_stock(rng: &mut RandomHelper, w_id: u32, i_id: u32, original: bool) -> Stock {
    Stock {
        w_id,
        i_id,
        quantity: rng.number(10, 100),
        dists: std::array::from_fn(|_| rng.alpha_string(24, 24)),
        ytd: 0,
        order_cnt: 0,
        remote_cnt: 0,
        data: make_data(rng, original),
    }
}

/// Everything the loader writes for one district.
#[derive(Debug, Clone)]
pub struct DistrictData {
    pub district: District,
    pub customers: Vec<Customer>,
    pub history: Vec<History>,
    pub orders: Vec<(Order, Vec<OrderLine>)>,
}

/// Builds a district with its customers, history and orders.
///
/// Orders are assigned to customers through a shuffled permutation of
/// `1..=customers_per_district`. The last `new_orders_per_district` orders
/// form the undelivered backlog.
pub fn generate_district_data(
    rng: &mut RandomHelper,
    w_id: u32,
    d_id: u32,
    scale: &ScaleParameters,
    now: i64,
) -> crate::Result<DistrictData> {
    let customers_per_district = scale.customers_per_district;
    let district = generate_district(rng, w_id, d_id, scale);

    let bad_credit: HashSet<u32> = rng
        .unique_ids(outlier_count(customers_per_district), 1, customers_per_district)?
        .into_iter()
        .collect();
    let mut customers = Vec::with_capacity(customers_per_district as usize);
    let mut history = Vec::with_capacity(customers_per_district as usize);
    for c_id in 1..=customers_per_district {
        let bad = bad_credit.contains(&c_id);
        customers.push(generate_customer(rng, w_id, d_id, c_id, scale, bad, now));
        history.push(generate_history(rng, w_id, d_id, c_id, now));
    }

    let mut permutation: Vec<u32> = (1..=customers_per_district).collect();
    rng.shuffle(&mut permutation);

    let first_new_order = customers_per_district - scale.new_orders_per_district + 1;
    let mut orders = Vec::with_capacity(customers_per_district as usize);
    for (o_id, c_id) in (1..=customers_per_district).zip(permutation) {
        let new_order = o_id >= first_new_order;
        let ol_cnt = rng.number(MIN_OL_CNT, MAX_OL_CNT);
        let order = generate_order(rng, w_id, d_id, o_id, c_id, ol_cnt, new_order, now);
        let lines = (1..=ol_cnt)
            .map(|number| generate_order_line(rng, w_id, d_id, o_id, number, scale, new_order, now))
            .collect();
        orders.push((order, lines));
    }

    Ok(DistrictData {
        district,
        customers,
        history,
        orders,
    })
}

/// Builds the stock rows of one warehouse.
pub fn generate_stock_for_warehouse(
    rng: &mut RandomHelper,
    w_id: u32,
    scale: &ScaleParameters,
) -> crate::Result<Vec<Stock>> {
    let originals: HashSet<u32> = rng
        .unique_ids(outlier_count(scale.items), 1, scale.items)?
        .into_iter()
        .collect();
    Ok((1..=scale.items)
        .map(|i_id| generate_stock(rng, w_id, i_id, originals.contains(&i_id)))
        .collect())
}

/// Builds the item catalog.
pub fn generate_items(rng: &mut RandomHelper, scale: &ScaleParameters) -> crate::Result<Vec<Item>> {
    let originals: HashSet<u32> = rng
        .unique_ids(outlier_count(scale.items), 1, scale.items)?
        .into_iter()
        .collect();
    Ok((1..=scale.items)
        .map(|i_id| generate_item(rng, i_id, originals.contains(&i_id)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale() -> ScaleParameters {
        ScaleParameters::new(200, 1, 2, 40, 12).unwrap()
    }

    #[test]
    fn test_original_marker_placement() {
        let mut rng = RandomHelper::new(11);
        for i in 0..200 {
            let item = generate_item(&mut rng, i + 1, true);
            assert!(item.is_original());
            assert!((26..=50).contains(&item.data.len()));
            let plain = generate_item(&mut rng, i + 1, false);
            assert!(!plain.is_original());
        }
    }

    #[test]
    fn test_items_have_ten_percent_originals() {
        let mut rng = RandomHelper::new(12);
        let items = generate_items(&mut rng, &scale()).unwrap();
        assert_eq!(items.len(), 200);
        assert_eq!(items.iter().filter(|i| i.is_original()).count(), 20);
        assert!(items.iter().all(|i| (1.00..=100.00).contains(&i.price)));
    }

    #[test]
    fn test_district_data_shape() {
        let mut rng = RandomHelper::new(13);
        let s = scale();
        let data = generate_district_data(&mut rng, 1, 2, &s, 1_000).unwrap();
        assert_eq!(data.district.next_o_id, 41);
        assert_eq!(data.customers.len(), 40);
        assert_eq!(data.history.len(), 40);
        assert_eq!(
            data.customers.iter().filter(|c| c.credit == Credit::Bad).count(),
            4
        );
        for c in &data.customers {
            assert_eq!(c.last, last_name(c.c_id - 1));
        }

        let mut assigned: Vec<u32> = data.orders.iter().map(|(o, _)| o.c_id).collect();
        assigned.sort_unstable();
        assert_eq!(assigned, (1..=40).collect::<Vec<_>>());

        for (order, lines) in &data.orders {
            assert_eq!(lines.len() as u32, order.ol_cnt);
            assert!((MIN_OL_CNT..=MAX_OL_CNT).contains(&order.ol_cnt));
            let backlog = order.o_id > 28;
            assert_eq!(order.is_undelivered(), backlog);
            for line in lines {
                assert!(line.i_id >= 1 && line.i_id <= s.items + 1);
                if backlog {
                    assert_eq!(line.amount, 0.0);
                    assert!(line.delivery_d.is_none());
                } else {
                    assert!(line.amount > 0.0);
                }
            }
        }
    }

    #[test]
    fn test_stock_quantities() {
        let mut rng = RandomHelper::new(14);
        let stock = generate_stock_for_warehouse(&mut rng, 3, &scale()).unwrap();
        assert_eq!(stock.len(), 200);
        assert!(stock.iter().all(|s| (10..=100).contains(&s.quantity) && s.w_id == 3));
        assert_eq!(stock.iter().filter(|s| s.is_original()).count(), 20);
    }
}
