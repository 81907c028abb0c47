//! 模拟订单生成器
//!
//! 使用 fake crate 生成能够通过校验的随机订单，并按比例构造非法消息，
//! 用于覆盖消费者的丢弃路径。

use chrono::{Duration, Utc};
use fake::Fake;
use fake::faker::address::en::{CityName, StateName, StreetName};
use fake::faker::company::en::{CatchPhrase, CompanyName};
use fake::faker::internet::en::{FreeEmailProvider, Username};
use fake::faker::name::en::Name;
use order_service::{Delivery, Item, Order, Payment};
use rand::Rng;
use uuid::Uuid;

/// 非法消息的构造方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
    /// 截断的 JSON，无法反序列化
    MalformedJson,
    /// 商品列表为空
    EmptyItems,
    /// 邮箱格式错误
    BadEmail,
    /// 支付金额为零
    ZeroAmount,
    /// 支付时间远超当前时间
    FuturePayment,
}

impl Corruption {
    const ALL: [Corruption; 5] = [
        Self::MalformedJson,
        Self::EmptyItems,
        Self::BadEmail,
        Self::ZeroAmount,
        Self::FuturePayment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedJson => "malformed_json",
            Self::EmptyItems => "empty_items",
            Self::BadEmail => "bad_email",
            Self::ZeroAmount => "zero_amount",
            Self::FuturePayment => "future_payment",
        }
    }

    fn random(rng: &mut impl Rng) -> Self {
        Self::ALL[rng.random_range(0..Self::ALL.len())]
    }
}

/// 待发送的消息体
#[derive(Debug, Clone)]
pub enum Body {
    /// 以 JSON 编码发送的订单（可能故意违反校验规则）
    Order(Box<Order>),
    /// 原始字节
    Raw(Vec<u8>),
}

/// 一条生成的消息
#[derive(Debug, Clone)]
pub struct GeneratedMessage {
    /// 消息 key，即订单号
    pub order_uid: String,
    pub body: Body,
    /// 为 None 表示合法订单
    pub corruption: Option<Corruption>,
}

/// 订单生成器
#[derive(Debug, Clone)]
pub struct OrderGenerator {
    invalid_ratio: f64,
}

impl OrderGenerator {
    pub fn new(invalid_ratio: f64) -> Self {
        Self {
            invalid_ratio: invalid_ratio.clamp(0.0, 1.0),
        }
    }

    /// 生成下一条消息，按配置比例随机构造非法消息
    pub fn next_message(&self) -> GeneratedMessage {
        let mut rng = rand::rng();
        let order = fake_order();

        if rng.random_bool(self.invalid_ratio) {
            corrupt(order, Corruption::random(&mut rng))
        } else {
            GeneratedMessage {
                order_uid: order.order_uid.clone(),
                body: Body::Order(Box::new(order)),
                corruption: None,
            }
        }
    }
}

/// 生成一个能通过校验的随机订单
pub fn fake_order() -> Order {
    let mut rng = rand::rng();
    let now = Utc::now();

    let order_uid = Uuid::new_v4().simple().to_string();
    let track_number: String = (0..12)
        .map(|_| rng.random_range(b'A'..=b'Z') as char)
        .collect();

    let items: Vec<Item> = (0..rng.random_range(1..=3usize))
        .map(|_| fake_item(&mut rng, &track_number))
        .collect();
    let goods_total: i64 = items.iter().map(|i| i.total_price).sum();
    let delivery_cost = rng.random_range(0..=500);

    Order {
        order_uid: order_uid.clone(),
        track_number,
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: Name().fake(),
            phone: format!("+1{}", digits(&mut rng, 10)),
            zip: digits(&mut rng, 5),
            city: CityName().fake(),
            address: format!(
                "{} {}",
                StreetName().fake::<String>(),
                rng.random_range(1..200u32)
            ),
            region: StateName().fake(),
            email: format!(
                "user{}@{}",
                digits(&mut rng, 6),
                FreeEmailProvider().fake::<String>()
            ),
        },
        payment: Payment {
            transaction: order_uid,
            request_id: String::new(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: goods_total + delivery_cost,
            payment_dt: now.timestamp(),
            bank: "AlphaBank".to_string(),
            delivery_cost,
            goods_total,
            custom_fee: 0,
        },
        items,
        locale: "en".to_string(),
        internal_signature: String::new(),
        customer_id: Username().fake(),
        delivery_service: "meest".to_string(),
        shardkey: rng.random_range(1..=9u8).to_string(),
        sm_id: rng.random_range(1..=100),
        date_created: now,
        oof_shard: "1".to_string(),
    }
}

fn fake_item(rng: &mut impl Rng, track_number: &str) -> Item {
    let price = rng.random_range(10..=500);
    let sale = rng.random_range(0..=50);

    Item {
        chrt_id: rng.random_range(100_000..=999_999),
        track_number: track_number.to_string(),
        price,
        rid: Uuid::new_v4().simple().to_string(),
        name: CatchPhrase().fake(),
        sale,
        size: "M".to_string(),
        total_price: price * i64::from(100 - sale) / 100,
        nm_id: rng.random_range(1_000_000..=9_999_999),
        brand: CompanyName().fake(),
        status: 202,
    }
}

/// 按指定方式破坏订单
pub fn corrupt(mut order: Order, corruption: Corruption) -> GeneratedMessage {
    let order_uid = order.order_uid.clone();

    let body = match corruption {
        Corruption::MalformedJson => {
            let json = serde_json::to_string(&order).unwrap_or_default();
            // 截掉一半，保证括号不闭合
            Body::Raw(json.as_bytes()[..json.len() / 2].to_vec())
        }
        Corruption::EmptyItems => {
            order.items.clear();
            Body::Order(Box::new(order))
        }
        Corruption::BadEmail => {
            order.delivery.email = "not-an-email".to_string();
            Body::Order(Box::new(order))
        }
        Corruption::ZeroAmount => {
            order.payment.amount = 0;
            Body::Order(Box::new(order))
        }
        Corruption::FuturePayment => {
            order.payment.payment_dt = (Utc::now() + Duration::days(7)).timestamp();
            Body::Order(Box::new(order))
        }
    };

    GeneratedMessage {
        order_uid,
        body,
        corruption: Some(corruption),
    }
}

fn digits(rng: &mut impl Rng, len: usize) -> String {
    (0..len)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}
