use rust_decimal::Decimal;
use serde::Serialize;
use tera::{Context, Tera};

use crate::domain::contract::ContractTemplate;
use crate::domain::customer::Customer;
use crate::domain::financing::FinancingPlan;
use crate::domain::proposal::Proposal;
use crate::errors::DomainError;

#[derive(Clone, Debug, Serialize)]
struct ContractLine {
    service: String,
    description: String,
    quantity: String,
    unit_price: String,
    total: String,
}

#[derive(Clone, Debug, Serialize)]
struct ContractView {
    proposal_id: String,
    customer_name: String,
    customer_address: String,
    services: Vec<String>,
    lines: Vec<ContractLine>,
    subtotal: String,
    discount: String,
    total: String,
    financing: Option<FinancingView>,
}

#[derive(Clone, Debug, Serialize)]
struct FinancingView {
    provider: String,
    plan_name: String,
    term_months: u32,
    monthly_payment: String,
}

/// Picks the active template for the first proposal service that has one,
/// falling back to the general template.
pub fn select_template<'a>(
    templates: &'a [ContractTemplate],
    proposal: &Proposal,
) -> Option<&'a ContractTemplate> {
    let active = || templates.iter().filter(|template| template.active);

    proposal
        .services
        .iter()
        .find_map(|service| active().find(|template| template.service == Some(*service)))
        .or_else(|| active().find(|template| template.service.is_none()))
}

pub fn render_contract(
    template: &ContractTemplate,
    proposal: &Proposal,
    customer: &Customer,
    plan: Option<&FinancingPlan>,
) -> Result<String, DomainError> {
    let view = ContractView {
        proposal_id: proposal.id.0.clone(),
        customer_name: customer.full_name(),
        customer_address: customer.address.clone().unwrap_or_default(),
        services: proposal.services.iter().map(|s| s.display_name().to_string()).collect(),
        lines: proposal
            .selections
            .iter()
            .map(|line| ContractLine {
                service: line.service.display_name().to_string(),
                description: line.description.clone(),
                quantity: line.quantity.normalize().to_string(),
                unit_price: format_money(line.unit_price),
                total: format_money(line.line_total()),
            })
            .collect(),
        subtotal: format_money(proposal.pricing.subtotal),
        discount: format_money(proposal.pricing.discount),
        total: format_money(proposal.pricing.total),
        financing: plan.map(|plan| FinancingView {
            provider: plan.provider.clone(),
            plan_name: plan.plan_name.clone(),
            term_months: plan.term_months,
            monthly_payment: proposal
                .pricing
                .monthly_payment
                .map(format_money)
                .unwrap_or_default(),
        }),
    };

    let mut context = Context::new();
    context.insert("proposal", &view);

    Tera::one_off(&template.body, &context, true).map_err(|error| {
        DomainError::Validation(format!("contract template `{}` failed: {error}", template.name))
    })
}

/// `$1,234.50`
pub fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{}${grouped}.{cents}", if negative { "-" } else { "" })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{format_money, render_contract, select_template};
    use crate::domain::contract::{ContractTemplate, ContractTemplateId};
    use crate::domain::customer::{Customer, CustomerId};
    use crate::domain::product::ProductId;
    use crate::domain::proposal::{ProductSelection, Proposal};
    use crate::domain::service::ServiceKind;
    use crate::domain::user::UserId;

    fn template(name: &str, service: Option<ServiceKind>, body: &str) -> ContractTemplate {
        ContractTemplate {
            id: ContractTemplateId::generate(),
            name: name.to_string(),
            service,
            body: body.to_string(),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn proposal() -> Proposal {
        let mut proposal = Proposal::new_draft(
            CustomerId("C-1".to_string()),
            UserId("rep".to_string()),
            vec![ServiceKind::Hvac, ServiceKind::Roofing],
            vec![ProductSelection {
                product_id: ProductId("prod-hv-16".to_string()),
                service: ServiceKind::Hvac,
                description: "16 SEER heat pump".to_string(),
                quantity: Decimal::ONE,
                unit_price: Decimal::from(11_250),
            }],
            Utc::now(),
        )
        .expect("draft");
        proposal.pricing.subtotal = Decimal::from(11_250);
        proposal.pricing.total = Decimal::from(11_250);
        proposal
    }

    fn customer() -> Customer {
        Customer {
            id: CustomerId("C-1".to_string()),
            first_name: "Pat".to_string(),
            last_name: "Homeowner".to_string(),
            email: None,
            phone: None,
            address: Some("12 Elm St".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn prefers_service_specific_template() {
        let templates = vec![
            template("General", None, "general"),
            template("Roofing", Some(ServiceKind::Roofing), "roofing"),
        ];

        let chosen = select_template(&templates, &proposal()).expect("template");
        assert_eq!(chosen.name, "Roofing");

        let general_only = vec![template("General", None, "general")];
        assert_eq!(
            select_template(&general_only, &proposal()).map(|t| t.name.as_str()),
            Some("General")
        );
    }

    #[test]
    fn renders_proposal_fields_into_template() {
        let body = "Agreement {{ proposal.proposal_id }} for {{ proposal.customer_name }}: \
                    {% for line in proposal.lines %}{{ line.description }} {{ line.total }}{% endfor %} \
                    total {{ proposal.total }}";
        let rendered = render_contract(&template("General", None, body), &proposal(), &customer(), None)
            .expect("render");

        assert!(rendered.contains("Pat Homeowner"));
        assert!(rendered.contains("16 SEER heat pump $11,250.00"));
        assert!(rendered.contains("total $11,250.00"));
    }

    #[test]
    fn broken_template_is_a_validation_error() {
        let result =
            render_contract(&template("Bad", None, "{{ proposal.total "), &proposal(), &customer(), None);
        assert!(result.is_err());
    }

    #[test]
    fn formats_money_with_grouping() {
        assert_eq!(format_money(Decimal::new(123_456_789, 2)), "$1,234,567.89");
        assert_eq!(format_money(Decimal::from(0)), "$0.00");
        assert_eq!(format_money(Decimal::new(-150, 1)), "-$15.00");
    }
}
