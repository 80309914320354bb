use oso::PolarClass;

use crate::entities::Tag;

fn optional_id(id: Option<uuid::Uuid>) -> String {
    id.map(|id| id.to_string()).unwrap_or_default()
}

impl PolarClass for Tag {
    fn get_polar_class_builder() -> oso::ClassBuilder<Tag> {
        oso::Class::builder()
            .name("Tag")
            .add_attribute_getter("id", |recv: &Tag| recv.id.to_string())
            .add_attribute_getter("passenger_id", |recv: &Tag| recv.passenger_id.to_string())
            .add_attribute_getter("driver_id", |recv: &Tag| optional_id(recv.driver_id))
            .add_attribute_getter("status", |recv: &Tag| recv.status.name().to_string())
    }

    fn get_polar_class() -> oso::Class {
        let builder = Tag::get_polar_class_builder();
        builder.build()
    }
}
