mod normalize;

pub use normalize::{
    contains_cyrillic,
    first_installment_date,
    format_birthday,
    format_phone_e164,
    format_phone_local,
    goods_label,
};
