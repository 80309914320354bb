use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated user behind a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub id: Uuid,
}

impl Caller {
    pub fn new(id: Uuid) -> Self {
        Self { id }
    }
}

impl PolarClass for Caller {
    fn get_polar_class_builder() -> oso::ClassBuilder<Caller> {
        oso::Class::builder()
            .name("Caller")
            .add_attribute_getter("id", |recv: &Caller| recv.id.to_string())
    }

    fn get_polar_class() -> oso::Class {
        let builder = Caller::get_polar_class_builder();
        builder.build()
    }
}
