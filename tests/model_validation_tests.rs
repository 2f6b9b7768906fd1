use estate_portal::models::{
    Coordinates, ImageUpload, Listing, ListingForm, ListingStatus, MAX_IMAGES_PER_LISTING,
    PropertyType, Role,
};
use estate_portal::error::ApiError;
use uuid::Uuid;

fn complete_form() -> ListingForm {
    ListingForm {
        title: Some("Seafront Cottage".to_string()),
        description: Some("Two-bed cottage overlooking the bay".to_string()),
        price: Some(250_000.0),
        property_type: Some(PropertyType::House),
        location: Some("Galway".to_string()),
        ..ListingForm::default()
    }
}

#[test]
fn create_validation_lists_every_missing_required_field() {
    let err = ListingForm::default().validate_create().unwrap_err();

    let ApiError::Validation(message) = err else {
        panic!("expected a validation error");
    };
    assert!(message.contains("title is required"));
    assert!(message.contains("description is required"));
    assert!(message.contains("price is required"));
    assert!(message.contains("type is required"));
}

#[test]
fn create_validation_accepts_a_complete_form() {
    assert!(complete_form().validate_create().is_ok());
}

#[test]
fn negative_price_is_rejected() {
    let form = ListingForm {
        price: Some(-1.0),
        ..complete_form()
    };
    assert!(form.validate_create().is_err());
}

#[test]
fn update_validation_ignores_absent_fields() {
    // A fully empty form is a valid no-op update.
    assert!(ListingForm::default().validate_update().is_ok());
}

#[test]
fn update_validation_still_checks_provided_fields() {
    let form = ListingForm {
        bedrooms: Some(-2),
        ..ListingForm::default()
    };
    assert!(form.validate_update().is_err());
}

#[test]
fn image_count_is_capped() {
    let form = ListingForm {
        images: (0..=MAX_IMAGES_PER_LISTING)
            .map(|i| ImageUpload {
                filename: format!("photo{i}.jpg"),
                content_type: "image/jpeg".to_string(),
                data: vec![],
            })
            .collect(),
        ..complete_form()
    };
    assert!(form.validate_create().is_err());
}

#[test]
fn out_of_range_coordinates_are_rejected() {
    let form = ListingForm {
        lng: Some(200.0),
        lat: Some(12.0),
        ..complete_form()
    };
    assert!(form.validate_create().is_err());
}

#[test]
fn half_a_coordinate_pair_is_dropped() {
    let form = ListingForm {
        lat: Some(53.27),
        ..ListingForm::default()
    };
    assert!(form.coordinates().is_none());
}

#[test]
fn into_listing_applies_defaults() {
    let agent = Uuid::new_v4();
    let listing = complete_form().into_listing(agent, vec![]);

    assert_eq!(listing.agent_id, agent);
    assert_eq!(listing.status, ListingStatus::Active);
    assert_eq!(listing.views, 0);
    assert_eq!(listing.bedrooms, 0);
    assert!(listing.images.is_empty());
    assert_ne!(listing.id, Uuid::nil());
}

#[test]
fn coordinates_serialize_as_lng_lat_pair() {
    let coords = Coordinates {
        lng: -9.05,
        lat: 53.27,
    };

    let json = serde_json::to_string(&coords).unwrap();
    assert_eq!(json, "[-9.05,53.27]");

    let back: Coordinates = serde_json::from_str("[-9.05,53.27]").unwrap();
    assert_eq!(back, coords);
}

#[test]
fn listing_round_trips_through_json() {
    let listing = Listing {
        id: Uuid::new_v4(),
        title: "Round Trip".to_string(),
        coordinates: Coordinates {
            lng: -6.26,
            lat: 53.35,
        },
        ..Listing::default()
    };

    let json = serde_json::to_value(&listing).unwrap();
    assert_eq!(json["coordinates"], serde_json::json!([-6.26, 53.35]));
    assert_eq!(json["status"], "active");

    let back: Listing = serde_json::from_value(json).unwrap();
    assert_eq!(back.id, listing.id);
    assert_eq!(back.coordinates, listing.coordinates);
}

#[test]
fn enums_parse_their_lowercase_names() {
    assert_eq!("house".parse::<PropertyType>().unwrap(), PropertyType::House);
    assert_eq!("condo".parse::<PropertyType>().unwrap(), PropertyType::Condo);
    assert!("castle".parse::<PropertyType>().is_err());

    assert_eq!("sold".parse::<ListingStatus>().unwrap(), ListingStatus::Sold);
    assert_eq!(
        "rented".parse::<ListingStatus>().unwrap(),
        ListingStatus::Rented
    );
    assert!("archived".parse::<ListingStatus>().is_err());

    assert_eq!("agent".parse::<Role>().unwrap(), Role::Agent);
    assert!("superuser".parse::<Role>().is_err());
}
