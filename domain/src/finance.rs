//! Stateless financial formulas exposed by the finance endpoints.
//!
//! Everything here is plain arithmetic over `f64`; inputs that would make a
//! formula meaningless (zero divisors, non-positive durations) are rejected
//! with [`DomainError::InvalidParameter`].

use crate::DomainError;
use serde::{Deserialize, Serialize};

fn ensure_positive(name: &str, value: f64) -> Result<(), DomainError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DomainError::invalid(name, "must be a positive number"))
    }
}

fn ensure_non_negative(name: &str, value: f64) -> Result<(), DomainError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(DomainError::invalid(name, "must not be negative"))
    }
}

/// Total cost of ownership over the asset lifetime:
/// `initial + (operating + maintenance) * lifetime_years`.
pub fn total_cost_of_ownership(
    initial_cost: f64,
    operating_cost: f64,
    maintenance_cost: f64,
    lifetime_years: f64,
) -> Result<f64, DomainError> {
    ensure_non_negative("initialCost", initial_cost)?;
    ensure_non_negative("operatingCost", operating_cost)?;
    ensure_non_negative("maintenanceCost", maintenance_cost)?;
    ensure_positive("lifetimeYears", lifetime_years)?;

    Ok(initial_cost + (operating_cost + maintenance_cost) * lifetime_years)
}

/// Return on investment in percent.
pub fn return_on_investment(profit: f64, investment: f64) -> Result<f64, DomainError> {
    ensure_positive("investment", investment)?;
    if !profit.is_finite() {
        return Err(DomainError::invalid("profit", "must be a finite number"));
    }
    Ok(profit / investment * 100.0)
}

/// Years until the investment is recovered from a constant annual income.
pub fn payback_period(investment: f64, annual_income: f64) -> Result<f64, DomainError> {
    ensure_non_negative("investment", investment)?;
    ensure_positive("annualIncome", annual_income)?;
    Ok(investment / annual_income)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sensitivity {
    pub base_value: f64,
    pub change_percentage: f64,
    pub low_value: f64,
    pub high_value: f64,
}

/// Moves `base_value` down and up by `change_percentage` percent (e.g. 20 for ±20%).
pub fn sensitivity(base_value: f64, change_percentage: f64) -> Result<Sensitivity, DomainError> {
    if !base_value.is_finite() {
        return Err(DomainError::invalid("baseValue", "must be a finite number"));
    }
    if !(0.0..=100.0).contains(&change_percentage) {
        return Err(DomainError::invalid(
            "changePercentage",
            "must be between 0 and 100",
        ));
    }

    let factor = change_percentage / 100.0;
    Ok(Sensitivity {
        base_value,
        change_percentage,
        low_value: base_value * (1.0 - factor),
        high_value: base_value * (1.0 + factor),
    })
}

// --- Real estate development project ---

/// Inputs of a residential development project.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RealEstateProject {
    pub floors: u32,
    pub units_per_floor: u32,
    /// Average apartment area, square meters.
    pub average_area: f64,
    pub price_per_sqm: f64,
    pub construction_cost_per_sqm: f64,
    pub land_cost: f64,
    pub utilities_cost: f64,
    pub design_cost: f64,
    pub marketing_cost: f64,
    pub other_costs: f64,
    pub land_tax: f64,
    pub construction_tax: f64,
    /// Fraction, e.g. 0.20 for 20%.
    pub profit_tax_rate: f64,
    pub project_duration_years: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Efficiency {
    High,
    Medium,
    Low,
    Unprofitable,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCalculation {
    pub total_apartments: u32,
    pub total_revenue: f64,
    pub construction_cost: f64,
    pub total_cost_before_tax: f64,
    pub profit_before_tax: f64,
    pub net_profit: f64,
    /// Percent.
    pub roi: f64,
    /// Percent per year.
    pub annualized_roi: f64,
}

impl ProjectCalculation {
    pub fn efficiency(&self) -> Efficiency {
        if self.roi > 25.0 {
            Efficiency::High
        } else if self.roi > 15.0 {
            Efficiency::Medium
        } else if self.roi > 0.0 {
            Efficiency::Low
        } else {
            Efficiency::Unprofitable
        }
    }
}

impl RealEstateProject {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.floors == 0 {
            return Err(DomainError::invalid("floors", "must be a positive number"));
        }
        if self.units_per_floor == 0 {
            return Err(DomainError::invalid(
                "unitsPerFloor",
                "must be a positive number",
            ));
        }
        ensure_positive("averageArea", self.average_area)?;
        ensure_positive("pricePerSqm", self.price_per_sqm)?;
        ensure_positive("constructionCostPerSqm", self.construction_cost_per_sqm)?;
        ensure_positive("projectDurationYears", self.project_duration_years)?;
        Ok(())
    }

    /// Validates the inputs, then computes revenue, costs, profit and ROI.
    pub fn calculate(&self) -> Result<ProjectCalculation, DomainError> {
        self.validate()?;

        let total_apartments = self.floors.checked_mul(self.units_per_floor).ok_or_else(|| {
            DomainError::invalid("unitsPerFloor", "floors times units per floor is too large")
        })?;
        let sellable_area = f64::from(total_apartments) * self.average_area;
        let total_revenue = sellable_area * self.price_per_sqm;
        let construction_cost = sellable_area * self.construction_cost_per_sqm;

        let total_cost_before_tax = self.land_cost
            + construction_cost
            + self.utilities_cost
            + self.design_cost
            + self.marketing_cost
            + self.other_costs
            + self.land_tax
            + self.construction_tax;

        let profit_before_tax = total_revenue - total_cost_before_tax;
        let net_profit = profit_before_tax * (1.0 - self.profit_tax_rate);
        let roi = net_profit / total_cost_before_tax * 100.0;
        let annualized_roi =
            ((1.0 + roi / 100.0).powf(1.0 / self.project_duration_years) - 1.0) * 100.0;

        Ok(ProjectCalculation {
            total_apartments,
            total_revenue,
            construction_cost,
            total_cost_before_tax,
            profit_before_tax,
            net_profit,
            roi,
            annualized_roi,
        })
    }
}
